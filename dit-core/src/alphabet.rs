//! # Alfabeto
//!
//! Mapeamento bidirecional `String ↔ id` usado para os labels e os atributos
//! do CRF. Os ids são atribuídos na ordem em que as strings aparecem pela
//! primeira vez; durante o treino o alfabeto só cresce e na inferência fica
//! congelado.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alphabet {
    pub to_id: HashMap<String, usize>,
    pub to_str: Vec<String>,
}

impl Alphabet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona `s` (se ainda não existir) e devolve seu id.
    pub fn add(&mut self, s: &str) -> usize {
        if let Some(&id) = self.to_id.get(s) {
            return id;
        }
        let id = self.to_str.len();
        self.to_id.insert(s.to_string(), id);
        self.to_str.push(s.to_string());
        id
    }

    pub fn get(&self, s: &str) -> Option<usize> {
        self.to_id.get(s).copied()
    }

    /// String de um id.
    pub fn label(&self, id: usize) -> Option<&str> {
        self.to_str.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_str.is_empty()
    }

    /// `to_id` e `to_str` descrevem a mesma bijeção.
    pub fn is_consistent(&self) -> bool {
        self.to_id.len() == self.to_str.len()
            && self
                .to_str
                .iter()
                .enumerate()
                .all(|(i, s)| self.to_id.get(s) == Some(&i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_in_first_seen_order() {
        let mut a = Alphabet::new();
        assert_eq!(a.add("hello"), 0);
        assert_eq!(a.add("world"), 1);
        assert_eq!(a.add("hello"), 0);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("world"), Some(1));
        assert_eq!(a.get("missing"), None);
        assert_eq!(a.label(1), Some("world"));
        assert_eq!(a.label(5), None);
        assert!(a.is_consistent());
    }

    #[test]
    fn test_inconsistent_alphabet_is_detected() {
        let mut a = Alphabet::new();
        a.add("x");
        a.to_str.push("y".into());
        assert!(!a.is_consistent());
    }
}
