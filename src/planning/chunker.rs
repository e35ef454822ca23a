//! Order-preserving partitioning used as a concurrency barrier.

/// Splits work into contiguous groups of at most `chunk_size` items.
/// Everything in one group runs concurrently; the next group does not
/// start until the whole group has finished.
#[derive(Debug, Clone, Copy)]
pub struct TaskChunker {
    chunk_size: usize,
}

impl TaskChunker {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            chunk_size: max_parallel.max(1),
        }
    }

    pub fn chunk<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        if items.is_empty() {
            return Vec::new();
        }

        let mut groups = Vec::with_capacity(items.len().div_ceil(self.chunk_size));
        let mut current = Vec::with_capacity(self.chunk_size.min(items.len()));
        for item in items {
            current.push(item);
            if current.len() == self.chunk_size {
                groups.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_items_into_three_groups() {
        let chunker = TaskChunker::new(5);
        let groups = chunker.chunk((0..12).collect::<Vec<_>>());

        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[test]
    fn test_order_preserved_across_and_within_groups() {
        let chunker = TaskChunker::new(3);
        let groups = chunker.chunk(vec!["a", "b", "c", "d", "e"]);

        let flattened: Vec<_> = groups.into_iter().flatten().collect();
        assert_eq!(flattened, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_empty_input() {
        let chunker = TaskChunker::new(4);
        assert!(chunker.chunk(Vec::<u8>::new()).is_empty());
    }

    #[test]
    fn test_zero_parallelism_is_treated_as_one() {
        let chunker = TaskChunker::new(0);
        let groups = chunker.chunk(vec![1, 2]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_exact_multiple() {
        let chunker = TaskChunker::new(2);
        let groups = chunker.chunk(vec![1, 2, 3, 4]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1], vec![3, 4]);
    }
}
