//! Arena-backed chain of GROUP BY levels
//!
//! Each level records the index of the level before it. Levels are never
//! removed; popping a GROUP BY (`RegroupIntoParent`) just moves the active
//! level back to its predecessor.

use super::errors::{GroupKeyError, GroupKeyResult};
use super::key::GroupKey;

static INITIAL: GroupKey = GroupKey::Initial;

/// Index of a level in a `GroupKeyChain`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelId(usize);

impl LevelId {
    /// Position in the arena
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Shape of one level
#[derive(Debug, Clone, PartialEq)]
pub enum LevelKind {
    /// Single group, no label
    Root,
    /// Every parent group split into `keys.len()` children
    ///
    /// `parent(g) = (g - 1) / K + 1`, `child(g) = (g - 1) % K`
    Expand { keys: Vec<GroupKey> },
    /// Same ids as the previous level, with empty groups marked absent
    ///
    /// `present` is indexed by group id; slot 0 is always false.
    Masked { present: Vec<bool> },
    /// Arbitrary per-group parents and keys, indexed by `g - 1`
    Explicit {
        parents: Vec<u32>,
        keys: Vec<GroupKey>,
    },
}

#[derive(Debug, Clone)]
struct Level {
    previous: Option<LevelId>,
    kind: LevelKind,
    num_groups: u32,
}

/// All GROUP BY levels built by one query
#[derive(Debug, Clone)]
pub struct GroupKeyChain {
    levels: Vec<Level>,
}

impl GroupKeyChain {
    /// Create a chain holding only the root level
    pub fn new() -> Self {
        Self {
            levels: vec![Level {
                previous: None,
                kind: LevelKind::Root,
                num_groups: 1,
            }],
        }
    }

    /// The root level
    pub fn root(&self) -> LevelId {
        LevelId(0)
    }

    /// Number of levels ever created
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false; the root level exists from construction
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn level(&self, id: LevelId) -> GroupKeyResult<&Level> {
        self.levels
            .get(id.0)
            .ok_or_else(|| GroupKeyError::invalid_level(format!("no level {}", id.0)))
    }

    fn push(&mut self, previous: LevelId, kind: LevelKind, num_groups: u32) -> LevelId {
        self.levels.push(Level {
            previous: Some(previous),
            kind,
            num_groups,
        });
        LevelId(self.levels.len() - 1)
    }

    /// Split every group of `previous` into one child per key
    pub fn expand(&mut self, previous: LevelId, keys: Vec<GroupKey>) -> GroupKeyResult<LevelId> {
        if keys.is_empty() {
            return Err(GroupKeyError::invalid_level("expansion needs at least one bucket"));
        }
        let parent_groups = self.level(previous)?.num_groups;
        let per_parent = u32::try_from(keys.len())
            .map_err(|_| GroupKeyError::overflow(parent_groups, u32::MAX))?;
        let num_groups = parent_groups
            .checked_mul(per_parent)
            .ok_or_else(|| GroupKeyError::overflow(parent_groups, per_parent))?;
        Ok(self.push(previous, LevelKind::Expand { keys }, num_groups))
    }

    /// Seven buckets per parent, Monday first
    pub fn day_of_week(&mut self, previous: LevelId) -> GroupKeyResult<LevelId> {
        self.expand(previous, (0..7).map(GroupKey::day_of_week).collect())
    }

    /// Mark groups of `previous` present or absent
    pub fn mask(&mut self, previous: LevelId, mut present: Vec<bool>) -> GroupKeyResult<LevelId> {
        let num_groups = self.level(previous)?.num_groups;
        if present.len() != num_groups as usize + 1 {
            return Err(GroupKeyError::invalid_level(format!(
                "presence mask has {} slots, expected {}",
                present.len(),
                num_groups + 1
            )));
        }
        present[0] = false;
        Ok(self.push(previous, LevelKind::Masked { present }, num_groups))
    }

    /// Level with explicit parent and key tables
    pub fn explicit(
        &mut self,
        previous: LevelId,
        parents: Vec<u32>,
        keys: Vec<GroupKey>,
    ) -> GroupKeyResult<LevelId> {
        if parents.len() != keys.len() {
            return Err(GroupKeyError::invalid_level(format!(
                "{} parents for {} keys",
                parents.len(),
                keys.len()
            )));
        }
        let parent_groups = self.level(previous)?.num_groups;
        if let Some(bad) = parents.iter().find(|p| **p == 0 || **p > parent_groups) {
            return Err(GroupKeyError::out_of_range(*bad, parent_groups));
        }
        let num_groups = u32::try_from(keys.len())
            .map_err(|_| GroupKeyError::overflow(parent_groups, u32::MAX))?;
        Ok(self.push(previous, LevelKind::Explicit { parents, keys }, num_groups))
    }

    /// Level kind, for inspection
    pub fn kind(&self, level: LevelId) -> GroupKeyResult<&LevelKind> {
        Ok(&self.level(level)?.kind)
    }

    /// The level this one was built on
    pub fn previous(&self, level: LevelId) -> Option<LevelId> {
        self.levels.get(level.0).and_then(|l| l.previous)
    }

    /// Group ids minted at this level (valid ids are `1..=num_groups`)
    pub fn num_groups(&self, level: LevelId) -> u32 {
        self.levels.get(level.0).map(|l| l.num_groups).unwrap_or(0)
    }

    /// Number of GROUP BY levels above the root, masks excluded
    pub fn depth(&self, level: LevelId) -> usize {
        let mut depth = 0;
        let mut current = Some(level);
        while let Some(id) = current {
            match self.levels.get(id.0).map(|l| &l.kind) {
                Some(LevelKind::Expand { .. }) | Some(LevelKind::Explicit { .. }) => depth += 1,
                _ => {}
            }
            current = self.previous(id);
        }
        depth
    }

    /// Map a group at this level to its group at the previous level
    ///
    /// Identity at the root and for masks.
    pub fn parent_group(&self, level: LevelId, group: u32) -> GroupKeyResult<u32> {
        let entry = self.level(level)?;
        if group == 0 || group > entry.num_groups {
            return Err(GroupKeyError::out_of_range(group, entry.num_groups));
        }
        Ok(match &entry.kind {
            LevelKind::Root | LevelKind::Masked { .. } => group,
            LevelKind::Expand { keys } => (group - 1) / keys.len() as u32 + 1,
            LevelKind::Explicit { parents, .. } => parents[group as usize - 1],
        })
    }

    /// Key of a group at this level
    ///
    /// Masks report the key of the level they wrap.
    pub fn group_key(&self, level: LevelId, group: u32) -> GroupKeyResult<&GroupKey> {
        let entry = self.level(level)?;
        if group == 0 || group > entry.num_groups {
            return Err(GroupKeyError::out_of_range(group, entry.num_groups));
        }
        match &entry.kind {
            LevelKind::Root => Ok(&INITIAL),
            LevelKind::Expand { keys } => Ok(&keys[(group as usize - 1) % keys.len()]),
            LevelKind::Explicit { keys, .. } => Ok(&keys[group as usize - 1]),
            LevelKind::Masked { .. } => match entry.previous {
                Some(previous) => self.group_key(previous, group),
                None => Err(GroupKeyError::invalid_level("mask without a previous level")),
            },
        }
    }

    /// Whether a group id denotes a live partition
    pub fn is_present(&self, level: LevelId, group: u32) -> bool {
        let Some(entry) = self.levels.get(level.0) else {
            return false;
        };
        if group == 0 || group > entry.num_groups {
            return false;
        }
        if let LevelKind::Masked { present } = &entry.kind {
            if !present.get(group as usize).copied().unwrap_or(false) {
                return false;
            }
        }
        match entry.previous {
            None => true,
            Some(previous) => match self.parent_group(level, group) {
                Ok(parent) => self.is_present(previous, parent),
                Err(_) => false,
            },
        }
    }

    /// Skip mask levels, returning the first level that owns keys
    pub fn unmasked(&self, level: LevelId) -> LevelId {
        let mut current = level;
        while let Some(entry) = self.levels.get(current.0) {
            match (&entry.kind, entry.previous) {
                (LevelKind::Masked { .. }, Some(previous)) => current = previous,
                _ => break,
            }
        }
        current
    }

    /// Full label list for a group, root first
    pub fn labels(&self, level: LevelId, group: u32) -> GroupKeyResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut current = level;
        let mut g = group;
        loop {
            let entry = self.level(current)?;
            if !matches!(entry.kind, LevelKind::Masked { .. }) {
                keys.push(self.group_key(current, g)?);
            }
            match entry.previous {
                Some(previous) => {
                    g = self.parent_group(current, g)?;
                    current = previous;
                }
                None => break,
            }
        }
        let mut labels = Vec::with_capacity(keys.len());
        for key in keys.into_iter().rev() {
            key.add_to_labels(&mut labels);
        }
        Ok(labels)
    }
}

impl Default for GroupKeyChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(names: &[&str]) -> Vec<GroupKey> {
        names.iter().map(|n| GroupKey::StringTerm(n.to_string())).collect()
    }

    #[test]
    fn test_root_level() {
        let chain = GroupKeyChain::new();
        let root = chain.root();
        assert_eq!(chain.num_groups(root), 1);
        assert!(chain.is_present(root, 1));
        assert!(!chain.is_present(root, 0));
        assert_eq!(chain.parent_group(root, 1).unwrap(), 1);
        assert_eq!(chain.group_key(root, 1).unwrap(), &GroupKey::Initial);
        assert!(chain.labels(root, 1).unwrap().is_empty());
    }

    #[test]
    fn test_day_of_week_arithmetic() {
        let mut chain = GroupKeyChain::new();
        let outer = chain.expand(chain.root(), terms(&["a", "b", "c"])).unwrap();
        let days = chain.day_of_week(outer).unwrap();
        assert_eq!(chain.num_groups(days), 21);
        for g in 1..=21 {
            assert_eq!(chain.parent_group(days, g).unwrap(), (g - 1) / 7 + 1);
            assert_eq!(
                chain.group_key(days, g).unwrap(),
                &GroupKey::DayOfWeek(((g - 1) % 7) as u8)
            );
            assert!(chain.is_present(days, g));
        }
        assert!(!chain.is_present(days, 0));
        assert!(!chain.is_present(days, 22));
    }

    #[test]
    fn test_group_key_out_of_range() {
        let mut chain = GroupKeyChain::new();
        let level = chain.expand(chain.root(), terms(&["x", "y"])).unwrap();
        assert!(chain.group_key(level, 0).is_err());
        let err = chain.group_key(level, 3).unwrap_err();
        assert_eq!(err.code(), super::super::errors::GroupKeyErrorCode::OutOfRange);
    }

    #[test]
    fn test_labels_walk_root_to_leaf() {
        let mut chain = GroupKeyChain::new();
        let outer = chain.expand(chain.root(), terms(&["a", "b"])).unwrap();
        let inner = chain
            .expand(outer, vec![GroupKey::IntTerm(1), GroupKey::Default])
            .unwrap();
        assert_eq!(chain.labels(inner, 3).unwrap(), vec!["b", "1"]);
        assert_eq!(chain.labels(inner, 2).unwrap(), vec!["a", "DEFAULT"]);
        assert_eq!(chain.depth(inner), 2);
    }

    #[test]
    fn test_mask_hides_gaps_and_children() {
        let mut chain = GroupKeyChain::new();
        let outer = chain.expand(chain.root(), terms(&["a", "b", "c"])).unwrap();
        let masked = chain.mask(outer, vec![true, true, false, true]).unwrap();
        assert!(chain.is_present(masked, 1));
        assert!(!chain.is_present(masked, 2));
        assert_eq!(chain.labels(masked, 3).unwrap(), vec!["c"]);
        assert_eq!(chain.parent_group(masked, 2).unwrap(), 2);
        assert_eq!(chain.unmasked(masked), outer);

        let days = chain.day_of_week(masked).unwrap();
        // children of the absent group 2 are absent too
        assert!(!chain.is_present(days, 8));
        assert!(chain.is_present(days, 15));
    }

    #[test]
    fn test_mask_length_checked() {
        let mut chain = GroupKeyChain::new();
        let outer = chain.expand(chain.root(), terms(&["a", "b"])).unwrap();
        assert!(chain.mask(outer, vec![false, true]).is_err());
    }

    #[test]
    fn test_explicit_level() {
        let mut chain = GroupKeyChain::new();
        let outer = chain.expand(chain.root(), terms(&["a", "b"])).unwrap();
        let sparse = chain
            .explicit(outer, vec![1, 2, 2], terms(&["a1", "b1", "b2"]))
            .unwrap();
        assert_eq!(chain.num_groups(sparse), 3);
        assert_eq!(chain.parent_group(sparse, 3).unwrap(), 2);
        assert_eq!(chain.labels(sparse, 3).unwrap(), vec!["b", "b2"]);
        assert!(chain.explicit(outer, vec![3], terms(&["z"])).is_err());
    }

    #[test]
    fn test_overflow_detected() {
        let mut chain = GroupKeyChain::new();
        let wide = chain
            .expand(chain.root(), vec![GroupKey::Default; 70_000])
            .unwrap();
        assert!(chain.expand(wide, vec![GroupKey::Default; 70_000]).is_err());
    }
}
