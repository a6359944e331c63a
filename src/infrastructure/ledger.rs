use crate::config::SimulatorConfig;
use crate::domain::account::{Account, Holding, Transaction};
use crate::domain::errors::BrokerError;
use crate::domain::money::Money;
use crate::domain::order::Order;
use anyhow::{Context, Result, bail};
use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const ACCOUNT_FILE: &str = "account.json";
const ORDERS_FILE: &str = "orders.json";
const HOLDINGS_FILE: &str = "holdings.json";
const TRANSACTIONS_FILE: &str = "transactions.json";
const CONFIG_SNAPSHOT_FILE: &str = "config_snapshot.json";

const ALL_FILES: [&str; 5] = [
    ACCOUNT_FILE,
    ORDERS_FILE,
    HOLDINGS_FILE,
    TRANSACTIONS_FILE,
    CONFIG_SNAPSHOT_FILE,
];

/// Aggregate statistics over the ledger's collections.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub total_transactions: usize,
    pub total_charges: Money,
    pub realized_pnl: Money,
}

#[derive(Debug)]
struct LedgerState {
    account: Account,
    orders: Vec<Order>,
    holdings: HashMap<String, Holding>,
    transactions: Vec<Transaction>,
}

impl LedgerState {
    fn fresh(initial_capital: Money) -> Self {
        Self {
            account: Account::new(initial_capital),
            orders: Vec::new(),
            holdings: HashMap::new(),
            transactions: Vec::new(),
        }
    }
}

/// Durable mirror of the engine's state: one account record, the order
/// history, the holding map and the append-only transaction log, each
/// persisted as its own JSON file under the configured root.
///
/// Every write replaces a whole collection atomically (temp file + rename),
/// so a crash mid-write corrupts at most that one collection. One mutex
/// guards the in-memory state; public methods take it exactly once, so no
/// read ever observes a write in progress.
pub struct Ledger {
    root: PathBuf,
    auto_save: bool,
    initial_capital: Money,
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Open (or initialize) the ledger under `config.storage_path` and
    /// write a human-readable config snapshot alongside for diagnostics.
    pub fn open(config: &SimulatorConfig) -> Result<Self> {
        let root = config.storage_path.clone();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create storage directory {:?}", root))?;

        let initial_capital = Money::new(config.initial_capital);
        let state = Self::load_state(&root, initial_capital);

        atomic_write(
            &root.join(CONFIG_SNAPSHOT_FILE),
            &serde_json::to_string_pretty(config).context("failed to serialize config snapshot")?,
        )?;

        info!(
            "Ledger opened at {:?}: {} orders, {} holdings, {} transactions",
            root,
            state.orders.len(),
            state.holdings.len(),
            state.transactions.len()
        );
        Ok(Self {
            root,
            auto_save: config.auto_save,
            initial_capital,
            state: Mutex::new(state),
        })
    }

    fn load_state(root: &Path, initial_capital: Money) -> LedgerState {
        let account = match read_json::<Account>(&root.join(ACCOUNT_FILE)) {
            Ok(Some(account)) => account,
            Ok(None) => Account::new(initial_capital),
            Err(e) => {
                warn!("Account file unreadable, reinitializing: {e:#}");
                Account::new(initial_capital)
            }
        };
        LedgerState {
            account,
            orders: read_records(&root.join(ORDERS_FILE), "order"),
            holdings: read_holding_map(&root.join(HOLDINGS_FILE)),
            transactions: read_records(&root.join(TRANSACTIONS_FILE), "transaction"),
        }
    }

    // ----- account -----

    pub fn account(&self) -> Account {
        self.state.lock().unwrap().account.clone()
    }

    pub fn update_account(&self, mutate: impl FnOnce(&mut Account)) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        mutate(&mut state.account);
        state.account.updated_at = chrono::Utc::now();
        if self.auto_save {
            self.persist_account(&state)?;
        }
        Ok(())
    }

    // ----- orders -----

    pub fn record_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.orders.push(order.clone());
        if self.auto_save {
            self.persist_orders(&state)?;
        }
        Ok(())
    }

    pub fn update_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = order.order_id.as_deref();
        let Some(slot) = state
            .orders
            .iter_mut()
            .find(|o| o.order_id.as_deref() == id && id.is_some())
        else {
            return Err(BrokerError::UnknownOrder(
                id.unwrap_or("<unplaced>").to_string(),
            )
            .into());
        };
        *slot = order.clone();
        if self.auto_save {
            self.persist_orders(&state)?;
        }
        Ok(())
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.state
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.order_id.as_deref() == Some(order_id))
            .cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn orders_for_symbol(&self, symbol: &str) -> Vec<Order> {
        let symbol = symbol.to_ascii_uppercase();
        self.state
            .lock()
            .unwrap()
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn pending_orders(&self) -> Vec<Order> {
        self.state
            .lock()
            .unwrap()
            .orders
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    // ----- holdings -----

    pub fn upsert_holding(&self, holding: &Holding) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .holdings
            .insert(holding.symbol.clone(), holding.clone());
        if self.auto_save {
            self.persist_holdings(&state)?;
        }
        Ok(())
    }

    pub fn remove_holding(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.holdings.remove(symbol);
        if self.auto_save {
            self.persist_holdings(&state)?;
        }
        Ok(())
    }

    pub fn holdings(&self) -> Vec<Holding> {
        let state = self.state.lock().unwrap();
        let mut all: Vec<Holding> = state.holdings.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    // ----- transactions -----

    pub fn append_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.transactions.push(tx.clone());
        if self.auto_save {
            self.persist_transactions(&state)?;
        }
        Ok(())
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.state.lock().unwrap();
        LedgerStats {
            total_orders: state.orders.len(),
            pending_orders: state
                .orders
                .iter()
                .filter(|o| o.status.is_active())
                .count(),
            total_transactions: state.transactions.len(),
            total_charges: state.transactions.iter().map(|t| t.charges).sum(),
            realized_pnl: state.account.realized_pnl,
        }
    }

    // ----- durability -----

    /// Persist every collection, regardless of the auto-save flag.
    pub fn save_all(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        self.persist_account(&state)?;
        self.persist_orders(&state)?;
        self.persist_holdings(&state)?;
        self.persist_transactions(&state)?;
        Ok(())
    }

    /// Copy all collections plus the config snapshot into a timestamped
    /// directory under the storage root and return its path.
    pub fn backup(&self) -> Result<PathBuf> {
        // Hold the lock across the flush and the copy so the backup is a
        // consistent snapshot.
        let state = self.state.lock().unwrap();
        self.persist_account(&state)?;
        self.persist_orders(&state)?;
        self.persist_holdings(&state)?;
        self.persist_transactions(&state)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let dir = self.root.join(format!("backup_{stamp}"));
        fs::create_dir_all(&dir).with_context(|| format!("failed to create backup dir {dir:?}"))?;
        for name in ALL_FILES {
            let src = self.root.join(name);
            if src.exists() {
                fs::copy(&src, dir.join(name))
                    .with_context(|| format!("failed to copy {name} into backup"))?;
            }
        }
        info!("Ledger backed up to {:?}", dir);
        Ok(dir)
    }

    /// Copy collections back from a backup directory and reload in-memory
    /// state from them.
    pub fn restore(&self, backup_dir: &Path) -> Result<()> {
        if !backup_dir.is_dir() {
            bail!("backup directory {:?} does not exist", backup_dir);
        }
        let mut state = self.state.lock().unwrap();
        for name in ALL_FILES {
            let src = backup_dir.join(name);
            if src.exists() {
                fs::copy(&src, self.root.join(name))
                    .with_context(|| format!("failed to restore {name} from backup"))?;
            }
        }
        *state = Self::load_state(&self.root, self.initial_capital);
        info!("Ledger restored from {:?}", backup_dir);
        Ok(())
    }

    /// Wipe everything back to a fresh account at the initial capital.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state = LedgerState::fresh(self.initial_capital);
        self.persist_account(&state)?;
        self.persist_orders(&state)?;
        self.persist_holdings(&state)?;
        self.persist_transactions(&state)?;
        info!("Ledger reset to initial capital {}", self.initial_capital);
        Ok(())
    }

    fn persist_account(&self, state: &LedgerState) -> Result<()> {
        write_json(&self.root.join(ACCOUNT_FILE), &state.account)
    }

    fn persist_orders(&self, state: &LedgerState) -> Result<()> {
        write_json(&self.root.join(ORDERS_FILE), &state.orders)
    }

    fn persist_holdings(&self, state: &LedgerState) -> Result<()> {
        write_json(&self.root.join(HOLDINGS_FILE), &state.holdings)
    }

    fn persist_transactions(&self, state: &LedgerState) -> Result<()> {
        write_json(&self.root.join(TRANSACTIONS_FILE), &state.transactions)
    }
}

/// Atomic whole-file replace: write to a temp file, then rename over the
/// target.
fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let temp = path.with_extension("tmp");
    fs::write(&temp, content).with_context(|| format!("failed to write {temp:?}"))?;
    fs::rename(&temp, path).with_context(|| format!("failed to rename {temp:?} into place"))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {path:?}"))?;
    atomic_write(path, &content)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    let value = serde_json::from_str(&content).with_context(|| format!("failed to parse {path:?}"))?;
    Ok(Some(value))
}

/// The holdings collection is a map keyed by symbol; load it with the
/// same per-record leniency as the list collections.
fn read_holding_map(path: &Path) -> HashMap<String, Holding> {
    let raw = match read_json::<HashMap<String, serde_json::Value>>(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return HashMap::new(),
        Err(e) => {
            warn!("Skipping unreadable holding collection {path:?}: {e:#}");
            return HashMap::new();
        }
    };
    let mut holdings = HashMap::with_capacity(raw.len());
    for (symbol, value) in raw {
        match serde_json::from_value::<Holding>(value) {
            Ok(holding) => {
                holdings.insert(symbol, holding);
            }
            Err(e) => warn!("Skipping malformed holding record '{symbol}' in {path:?}: {e}"),
        }
    }
    holdings
}

/// Load a list collection leniently: a record that fails to parse is
/// logged and skipped rather than failing the whole batch.
fn read_records<T: DeserializeOwned>(path: &Path, kind: &str) -> Vec<T> {
    let raw = match read_json::<Vec<serde_json::Value>>(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!("Skipping unreadable {kind} collection {path:?}: {e:#}");
            return Vec::new();
        }
    };
    let mut records = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed {kind} record in {path:?}: {e}"),
        }
    }
    records
}
