//! Marketing action lookup per RFV score

use std::collections::BTreeMap;

use crate::model::{compose_score, Grade, Score};

const MARKETING_ACTIONS: [((Grade, Grade, Grade), &str); 4] = [
    (
        (Grade::A, Grade::A, Grade::A),
        "Enviar cupons de desconto, pedir indicação de amigos.",
    ),
    (
        (Grade::D, Grade::D, Grade::D),
        "Clientes com baixo gasto e baixa frequência, pouca ação necessária.",
    ),
    (
        (Grade::D, Grade::A, Grade::A),
        "Clientes de alto valor, enviar cupons para recuperação.",
    ),
    (
        (Grade::C, Grade::A, Grade::A),
        "Clientes com compras altas no passado, tentar reengajamento.",
    ),
];

/// Static score → recommendation table
///
/// Scores without an entry have no action; there is no fallback text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTable {
    entries: BTreeMap<Score, String>,
}

impl ActionTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The four built-in campaign recommendations
    pub fn marketing_default() -> Self {
        let entries = MARKETING_ACTIONS
            .iter()
            .map(|&((r, f, v), action)| (compose_score(r, f, v), action.to_string()))
            .collect();
        Self { entries }
    }

    /// Add or replace the action for `score`, returning the previous one
    pub fn insert(&mut self, score: Score, action: impl Into<String>) -> Option<String> {
        self.entries.insert(score, action.into())
    }

    pub fn map_action(&self, score: &Score) -> Option<&str> {
        self.entries.get(score).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Score, &str)> {
        self.entries.iter().map(|(score, action)| (score, action.as_str()))
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::marketing_default()
    }
}

/// Look up the recommendation for a score
pub fn map_action<'a>(score: &Score, table: &'a ActionTable) -> Option<&'a str> {
    table.map_action(score)
}
