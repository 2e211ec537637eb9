use crate::atomic::Mutation;
use crate::config::BatchConfig;
use crate::key::Key;

/// A single write the planner places into a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set(Key, Vec<u8>),
    Delete(Key),
}

impl Operation {
    pub fn key(&self) -> &Key {
        match self {
            Operation::Set(key, _) | Operation::Delete(key) => key,
        }
    }

    /// Planning size: the value for a set, the encoded key for a delete.
    pub fn size(&self) -> usize {
        match self {
            Operation::Set(_, value) => value.len(),
            Operation::Delete(key) => key.encoded_len(),
        }
    }

    pub fn as_mutation(&self) -> Mutation<'_> {
        match self {
            Operation::Set(key, value) => Mutation::Set { key, value },
            Operation::Delete(key) => Mutation::Delete { key },
        }
    }
}

/// Operations committed together, with their running totals.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Group {
    operations: Vec<Operation>,
    bytes: usize,
}

impl Group {
    fn push(&mut self, op: Operation, size: usize) {
        self.bytes += size;
        self.operations.push(op);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Cumulative planning size of the group.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Planner splits an ordered stream of operations into groups no larger than
/// `max_items` operations and `max_bytes` bytes.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    max_items: usize,
    max_bytes: usize,
}

impl Planner {
    pub fn new(config: &BatchConfig) -> Self {
        Self::with_limits(config.max_items, config.max_group_bytes())
    }

    pub fn with_limits(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            max_bytes,
        }
    }

    /// Lazily group `ops`, preserving their order. An operation larger than the
    /// whole budget still gets a group of its own; operations are never split.
    pub fn plan<I>(&self, ops: I) -> Groups<I::IntoIter>
    where
        I: IntoIterator<Item = Operation>,
    {
        Groups {
            ops: ops.into_iter(),
            planner: *self,
            pending: None,
        }
    }
}

/// Iterator returned by [`Planner::plan`].
pub struct Groups<I> {
    ops: I,
    planner: Planner,
    pending: Option<Operation>,
}

impl<I> Iterator for Groups<I>
where
    I: Iterator<Item = Operation>,
{
    type Item = Group;

    fn next(&mut self) -> Option<Group> {
        let mut group = Group::default();

        while group.len() < self.planner.max_items {
            let Some(op) = self.pending.take().or_else(|| self.ops.next()) else {
                break;
            };
            let size = op.size();
            if !group.is_empty() && group.bytes + size > self.planner.max_bytes {
                self.pending = Some(op);
                break;
            }
            group.push(op, size);
        }

        if group.is_empty() { None } else { Some(group) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(i: i64, size: usize) -> Operation {
        Operation::Set(key!["k", i], vec![0u8; size])
    }

    /// Deterministic sizes with plenty of variety, including zeros.
    fn mixed_ops(n: i64) -> Vec<Operation> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        (0..n)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                if state % 5 == 0 {
                    Operation::Delete(key!["k", i])
                } else {
                    set(i, (state % 300) as usize)
                }
            })
            .collect()
    }

    #[test]
    fn concatenated_groups_reproduce_input() {
        for (items, bytes) in [(1, 100), (3, 500), (7, 256), (1000, 819_000)] {
            let planner = Planner::with_limits(items, bytes);
            let ops = mixed_ops(250);
            let flattened: Vec<Operation> = planner
                .plan(ops.clone())
                .flat_map(Group::into_operations)
                .collect();
            assert_eq!(flattened, ops, "limits ({}, {})", items, bytes);
        }
    }

    #[test]
    fn groups_respect_both_ceilings() {
        let planner = Planner::with_limits(7, 600);
        for group in planner.plan(mixed_ops(500)) {
            assert!(group.len() <= 7);
            let total: usize = group.operations().iter().map(Operation::size).sum();
            assert_eq!(total, group.bytes());
            assert!(group.bytes() <= 600 || group.len() == 1);
        }
    }

    #[test]
    fn item_ceiling_splits_large_batches() {
        let planner = Planner::new(&BatchConfig::default());
        let groups: Vec<Group> = planner.plan((0..1015).map(|i| set(i, 10))).collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 1000);
        assert_eq!(groups[1].len(), 15);
    }

    #[test]
    fn byte_ceiling_seals_group_before_overflow() {
        let planner = Planner::with_limits(100, 100);
        let groups: Vec<Group> = planner.plan((0..5).map(|i| set(i, 40))).collect();
        let sizes: Vec<usize> = groups.iter().map(Group::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn oversized_operation_gets_its_own_group() {
        let planner = Planner::with_limits(100, 100);
        let ops = vec![set(0, 10), set(1, 500), set(2, 10)];
        let groups: Vec<Group> = planner.plan(ops).collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].len(), 1);
        assert_eq!(groups[1].bytes(), 500);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let planner = Planner::new(&BatchConfig::default());
        assert_eq!(planner.plan(Vec::new()).count(), 0);
    }

    #[test]
    fn delete_size_is_encoded_key_length() {
        let k = key!["key", 3];
        assert_eq!(Operation::Delete(k.clone()).size(), k.encode().len());
        assert_eq!(Operation::Set(k, b"four".to_vec()).size(), 4);
    }
}
