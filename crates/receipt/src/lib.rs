pub mod parser;
pub mod record;

pub use parser::{NO_DESCRIPTION, ReceiptParser, UNKNOWN_VENDOR, summarize};
pub use record::{ClassifiedItem, ParsedReceipt};
