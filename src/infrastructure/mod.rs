pub mod ledger;
pub mod paper_broker;
pub mod price_provider;
