//! Case-insensitive target → handler subscription table.
//!
//! ASCII uppercase folding is sufficient here (per the original's own
//! rationale: avoiding an i18n dependency for hub method names, which are
//! identifiers, not user-facing text).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::ConfigurationError;
use crate::value::Value;

pub type Handler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

fn fold(target: &str) -> String {
    target.to_ascii_uppercase()
}

#[derive(Default)]
pub struct SubscriptionTable {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        target: &str,
        handler: Handler,
    ) -> Result<(), ConfigurationError> {
        if target.is_empty() {
            return Err(ConfigurationError::EmptyEventName);
        }
        let mut guard = self.handlers.lock().unwrap();
        if guard.contains_key(&fold(target)) {
            return Err(ConfigurationError::DuplicateSubscription(target.to_string()));
        }
        guard.insert(fold(target), handler);
        Ok(())
    }

    pub fn get(&self, target: &str) -> Option<Handler> {
        self.handlers.lock().unwrap().get(&fold(target)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lookup_is_case_insensitive() {
        let table = SubscriptionTable::new();
        table.register("BroadCAST", Arc::new(|_| {})).unwrap();
        assert!(table.get("broadcast").is_some());
        assert!(table.get("BROADCAST").is_some());
    }

    #[test]
    fn empty_name_is_rejected() {
        let table = SubscriptionTable::new();
        assert!(matches!(
            table.register("", Arc::new(|_| {})),
            Err(ConfigurationError::EmptyEventName)
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = SubscriptionTable::new();
        table.register("echo", Arc::new(|_| {})).unwrap();
        assert!(matches!(
            table.register("ECHO", Arc::new(|_| {})),
            Err(ConfigurationError::DuplicateSubscription(_))
        ));
    }

    #[test]
    fn handler_invoked_with_arguments() {
        let table = SubscriptionTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        table
            .register("m", Arc::new(move |args| {
                assert_eq!(args.len(), 2);
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        (table.get("M").unwrap())(vec![Value::from("m"), Value::Number(1.0)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
