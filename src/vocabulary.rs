//! Dense identifier assignment for node names and type names

use std::collections::HashMap;
use std::sync::Arc;

use crate::data::tokenizer::normalize_name;

/// Bidirectional mapping between names and dense 0-based IDs.
///
/// IDs are assigned in first-seen order, so interning the same sequence of
/// names always yields the same mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    /// Mapping from names to IDs
    ids: HashMap<String, u32>,

    /// Names indexed by ID
    names: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashMap::with_capacity(capacity),
            names: Vec::with_capacity(capacity),
        }
    }

    /// Build a vocabulary whose IDs follow the order of `names`.
    /// Returns the first repeated name, if any.
    pub fn from_names(names: Vec<String>) -> Result<Self, String> {
        let mut ids = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if ids.insert(name.clone(), id as u32).is_some() {
                return Err(name.clone());
            }
        }
        Ok(Self { ids, names })
    }

    /// Get or create the ID of the given name
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }

        let id = self.names.len() as u32;
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Intern a name, reporting whether it was already present
    pub fn insert(&mut self, name: &str) -> (u32, bool) {
        let before = self.names.len();
        let id = self.intern(name);
        (id, self.names.len() == before)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }

    /// Merge a shard built by a single worker.
    ///
    /// The shard's names are interned in the shard's own first-seen order;
    /// the returned table maps each shard-local ID to its global ID. Merging
    /// shards in file order yields the same IDs a sequential pass would.
    pub fn merge_shard(&mut self, shard: &Vocabulary) -> Vec<u32> {
        shard.names.iter().map(|name| self.intern(name)).collect()
    }
}

/// How names in a list become dense IDs.
///
/// Used for node names and for node and edge type names alike.
#[derive(Debug, Clone, PartialEq)]
pub enum DenseIds {
    /// Names are integers used directly, shifted by the minimum ID
    Numeric {
        minimum_id: u32,
        /// Largest dense ID seen so far
        maximum_id: Option<u32>,
    },

    /// Names are interned in first-seen order
    Interned(Vocabulary),

    /// Closed vocabulary read from a list file. Names are looked up and
    /// never added; with `minimum_id` they are integer positions in the
    /// list, shifted by the minimum.
    Listed {
        vocabulary: Arc<Vocabulary>,
        minimum_id: Option<u32>,
    },
}

fn parse_numeric(name: &str, minimum_id: u32) -> Result<u32, String> {
    let value: u32 = name
        .parse()
        .map_err(|_| format!("the identifier `{}` is not numeric", name))?;
    let id = value.checked_sub(minimum_id).ok_or_else(|| {
        format!(
            "the identifier {} is smaller than the minimum identifier {}",
            value, minimum_id
        )
    })?;
    // The number of IDs must itself fit in a u32
    if id == u32::MAX {
        return Err(format!(
            "the identifier {} is too large for the minimum identifier {}",
            value, minimum_id
        ));
    }
    Ok(id)
}

impl DenseIds {
    pub fn numeric(minimum_id: u32) -> Self {
        DenseIds::Numeric {
            minimum_id,
            maximum_id: None,
        }
    }

    pub fn listed(vocabulary: Vocabulary, numeric_minimum_id: Option<u32>) -> Self {
        DenseIds::Listed {
            vocabulary: Arc::new(vocabulary),
            minimum_id: numeric_minimum_id,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DenseIds::Numeric { .. })
    }

    /// Resolve a name to its dense ID
    pub fn resolve(&mut self, name: &str) -> Result<u32, String> {
        match self {
            DenseIds::Numeric {
                minimum_id,
                maximum_id,
            } => {
                let id = parse_numeric(name, *minimum_id)?;
                *maximum_id = Some(maximum_id.map_or(id, |max| max.max(id)));
                Ok(id)
            }
            DenseIds::Interned(vocabulary) => Ok(vocabulary.intern(name)),
            DenseIds::Listed {
                vocabulary,
                minimum_id: Some(minimum_id),
            } => {
                let id = parse_numeric(name, *minimum_id)?;
                if id as usize >= vocabulary.len() {
                    return Err(format!(
                        "the identifier {} is outside a list of {} names",
                        name,
                        vocabulary.len()
                    ));
                }
                Ok(id)
            }
            DenseIds::Listed {
                vocabulary,
                minimum_id: None,
            } => vocabulary
                .get(name)
                .ok_or_else(|| format!("`{}` is not in the list of known names", name)),
        }
    }

    /// Split a multi-valued field and resolve every name in it.
    ///
    /// Empty fields fall back to `default`; with no default the record has
    /// no name at all. Repeated names within one field are kept once.
    pub fn resolve_all(
        &mut self,
        value: Option<&str>,
        separator: char,
        default: Option<&str>,
        remove_chevrons: bool,
        remove_spaces: bool,
    ) -> Result<Vec<u32>, String> {
        let value = match value.filter(|value| !value.is_empty()).or(default) {
            Some(value) => value,
            None => return Ok(Vec::new()),
        };

        let mut ids: Vec<u32> = Vec::with_capacity(1);
        for token in value.split(separator) {
            let token = normalize_name(token, remove_chevrons, remove_spaces);
            if token.is_empty() {
                continue;
            }
            let id = self.resolve(&token)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Number of dense IDs in use
    pub fn len(&self) -> u32 {
        match self {
            DenseIds::Numeric { maximum_id, .. } => maximum_id.map_or(0, |max| max + 1),
            DenseIds::Interned(vocabulary) => vocabulary.len() as u32,
            DenseIds::Listed { vocabulary, .. } => vocabulary.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty IDs of the same kind, for a single worker
    pub fn shard(&self) -> DenseIds {
        match self {
            DenseIds::Numeric { minimum_id, .. } => DenseIds::numeric(*minimum_id),
            DenseIds::Interned(_) => DenseIds::Interned(Vocabulary::new()),
            DenseIds::Listed { .. } => self.clone(),
        }
    }

    /// Fold the IDs resolved by a shard into these ones.
    ///
    /// Interned shards return the table mapping their local IDs to global
    /// IDs. Numeric and listed IDs are already global.
    pub fn merge_shard(&mut self, shard: &DenseIds) -> Option<Vec<u32>> {
        match (self, shard) {
            (DenseIds::Interned(global), DenseIds::Interned(local)) => Some(global.merge_shard(local)),
            (
                DenseIds::Numeric { maximum_id, .. },
                DenseIds::Numeric {
                    maximum_id: local, ..
                },
            ) => {
                *maximum_id = (*maximum_id).max(*local);
                None
            }
            (DenseIds::Listed { .. }, DenseIds::Listed { .. }) => None,
            (global, _) => {
                debug_assert!(false, "shard of a different kind than {:?}", global.is_numeric());
                None
            }
        }
    }

    /// Name written to the target lists for the given dense ID
    pub fn name(&self, id: u32) -> String {
        match self {
            DenseIds::Numeric { minimum_id, .. } => (id as u64 + *minimum_id as u64).to_string(),
            DenseIds::Interned(vocabulary) => vocabulary.name(id).unwrap_or_default().to_string(),
            DenseIds::Listed { vocabulary, .. } => vocabulary.name(id).unwrap_or_default().to_string(),
        }
    }

    /// Every name, in ID order
    pub fn names(&self) -> Vec<String> {
        (0..self.len()).map(|id| self.name(id)).collect()
    }
}
