//! Engine registry — catalogue of strategy engine types, keyed by name.
//!
//! Mirrors the teacher's plugin-registry pattern: a factory closure per
//! engine type name, instantiated fresh on every lookup so no mutable state
//! leaks between evaluations.

use crate::engines::{BollingerBands, Macd, MovingAverageCrossover, RelativeStrengthIndex};
use crate::types::StrategyEngine;

pub type EngineFactory = Box<dyn Fn() -> Box<dyn StrategyEngine> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName { name: String },
    UnknownEngineType { name: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "engine type '{name}' is already registered"),
            Self::UnknownEngineType { name } => write!(f, "no engine type named '{name}' is registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

struct Entry {
    name: String,
    factory: EngineFactory,
}

/// Catalogue of available engine types. Insertion order is preserved for
/// deterministic `list()` output.
pub struct StrategyEngineRegistry {
    entries: Vec<Entry>,
}

impl StrategyEngineRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registry pre-loaded with the built-in engines: `ma_crossover`, `rsi`,
    /// `bollinger`, `macd`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("ma_crossover", || Box::new(MovingAverageCrossover))
            .expect("builtin names are unique");
        reg.register("rsi", || Box::new(RelativeStrengthIndex))
            .expect("builtin names are unique");
        reg.register("bollinger", || Box::new(BollingerBands))
            .expect("builtin names are unique");
        reg.register("macd", || Box::new(Macd)).expect("builtin names are unique");
        reg
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn StrategyEngine> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName { name });
        }
        self.entries.push(Entry {
            name,
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn instantiate(&self, name: &str) -> Result<Box<dyn StrategyEngine>, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| (e.factory)())
            .ok_or_else(|| RegistryError::UnknownEngineType {
                name: name.to_string(),
            })
    }
}

impl Default for StrategyEngineRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_all_present() {
        let reg = StrategyEngineRegistry::with_builtins();
        assert_eq!(reg.list(), vec!["ma_crossover", "rsi", "bollinger", "macd"]);
    }

    #[test]
    fn unknown_engine_type_errors() {
        let reg = StrategyEngineRegistry::with_builtins();
        assert!(matches!(
            reg.instantiate("nonexistent"),
            Err(RegistryError::UnknownEngineType { .. })
        ));
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut reg = StrategyEngineRegistry::new();
        reg.register("rsi", || Box::new(RelativeStrengthIndex)).unwrap();
        assert!(matches!(
            reg.register("rsi", || Box::new(RelativeStrengthIndex)),
            Err(RegistryError::DuplicateName { .. })
        ));
    }
}
