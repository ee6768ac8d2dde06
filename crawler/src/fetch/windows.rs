use crate::crawler_config::FinalWindow;

/// Split ids into contiguous windows of `size`, the last one holding the remainder.
///
/// With [`FinalWindow::ExcludeLast`] the remainder window drops the final id, and an
/// empty remainder window is emitted when the ids divide evenly.
pub fn partition<T: Clone>(ids: &[T], size: usize, final_window: FinalWindow) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut windows = Vec::with_capacity(ids.len() / size + 1);
    let mut i = 0;
    while i + size <= ids.len() {
        windows.push(ids[i..i + size].to_vec());
        i += size;
    }

    match final_window {
        FinalWindow::Inclusive => {
            if i < ids.len() {
                windows.push(ids[i..].to_vec());
            }
        }
        FinalWindow::ExcludeLast => {
            let end = ids.len().saturating_sub(1).max(i);
            windows.push(ids[i..end].to_vec());
        }
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    fn sizes(windows: &[Vec<usize>]) -> Vec<usize> {
        windows.iter().map(Vec::len).collect()
    }

    #[test]
    fn test_partition_inclusive() {
        assert_eq!(sizes(&partition(&ids(23), 10, FinalWindow::Inclusive)), vec![10, 10, 3]);
        assert_eq!(sizes(&partition(&ids(20), 10, FinalWindow::Inclusive)), vec![10, 10]);
        assert_eq!(sizes(&partition(&ids(1), 10, FinalWindow::Inclusive)), vec![1]);
        assert!(partition(&ids(0), 10, FinalWindow::Inclusive).is_empty());
    }

    #[test]
    fn test_partition_exclude_last() {
        let windows = partition(&ids(23), 10, FinalWindow::ExcludeLast);
        assert_eq!(sizes(&windows), vec![10, 10, 2]);
        assert_eq!(windows[2], vec![20, 21]);

        assert_eq!(sizes(&partition(&ids(20), 10, FinalWindow::ExcludeLast)), vec![10, 10, 0]);
        assert_eq!(sizes(&partition(&ids(1), 10, FinalWindow::ExcludeLast)), vec![0]);
    }

    #[test]
    fn test_partition_keeps_order() {
        let windows = partition(&ids(5), 2, FinalWindow::Inclusive);
        assert_eq!(windows, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }
}
