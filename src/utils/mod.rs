pub mod ledger;
pub mod validators;
