use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{AbstractValue, CodeLocation, Variable};

/// Result of a propagation run: `(location, variable) -> value`.
///
/// Locations only appear once they hold at least one variable. Lookups use
/// structural equality on freshly built keys and report absence as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplacementMap {
    #[serde(with = "entry_list")]
    entries: HashMap<CodeLocation, HashMap<Variable, AbstractValue>>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `var` at `loc`, replacing any earlier value.
    pub fn insert(&mut self, loc: CodeLocation, var: Variable, value: AbstractValue) {
        self.entries.entry(loc).or_default().insert(var, value);
    }

    pub fn contains_location(&self, loc: &CodeLocation) -> bool {
        self.entries.get(loc).is_some_and(|vars| !vars.is_empty())
    }

    /// Two-level existence check: the location, then the variable within it.
    pub fn contains(&self, loc: &CodeLocation, var: &Variable) -> bool {
        self.get(loc, var).is_some()
    }

    pub fn get(&self, loc: &CodeLocation, var: &Variable) -> Option<&AbstractValue> {
        self.entries.get(loc)?.get(var)
    }

    pub fn variables_at(&self, loc: &CodeLocation) -> Option<&HashMap<Variable, AbstractValue>> {
        self.entries.get(loc)
    }

    /// Number of recorded locations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }

    /// All entries, sorted by location then variable.
    pub fn sorted_entries(&self) -> Vec<(CodeLocation, &Variable, &AbstractValue)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .flat_map(|(loc, vars)| vars.iter().map(move |(var, value)| (*loc, var, value)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        out
    }
}

impl FromIterator<(CodeLocation, Variable, AbstractValue)> for ReplacementMap {
    fn from_iter<I: IntoIterator<Item = (CodeLocation, Variable, AbstractValue)>>(iter: I) -> Self {
        let mut map = ReplacementMap::new();
        for (loc, var, value) in iter {
            map.insert(loc, var, value);
        }
        map
    }
}

mod entry_list {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::dataflow::{AbstractValue, CodeLocation, Variable};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        location: CodeLocation,
        variable: Variable,
        value: AbstractValue,
    }

    type Entries = HashMap<CodeLocation, HashMap<Variable, AbstractValue>>;

    pub fn serialize<S: Serializer>(entries: &Entries, serializer: S) -> Result<S::Ok, S::Error> {
        let mut list: Vec<Entry> = entries
            .iter()
            .flat_map(|(loc, vars)| {
                vars.iter().map(move |(var, value)| Entry {
                    location: *loc,
                    variable: var.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        list.sort_by(|a, b| {
            a.location.cmp(&b.location).then_with(|| a.variable.cmp(&b.variable))
        });
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Entries, D::Error> {
        let list = Vec::<Entry>::deserialize(deserializer)?;
        let mut entries = Entries::new();
        for entry in list {
            entries.entry(entry.location).or_default().insert(entry.variable, entry.value);
        }
        Ok(entries)
    }
}
