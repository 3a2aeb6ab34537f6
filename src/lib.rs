pub mod config;
pub mod decision;
pub mod domain_utils;
pub mod error;
pub mod ml;
pub mod parser;
pub mod persistence;
pub mod rules;
pub mod scanner;

pub use config::Config;
pub use decision::{Decision, DecisionEngine, Verdict};
pub use error::{ErrorInfo, ErrorKind};
pub use ml::{MlAdapter, MlSignal};
pub use parser::ParsedEmail;
pub use rules::{RuleEngine, RuleEvaluation};
pub use scanner::{EmailScanner, ScanResult};
