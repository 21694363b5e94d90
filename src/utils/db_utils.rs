/// Typed value for dynamically built WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterValue {
    U64(u64),
    I32(i32),
    Str(&'static str),
}

/// Clamped `(page, per_page, offset)`; pages start at 1 and hold at most 100 rows.
pub fn paging(page: Option<u64>, per_page: Option<u64>) -> (u64, u64, u64) {
    let per_page = per_page.unwrap_or(10).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        assert_eq!(paging(None, None), (1, 10, 0));
        assert_eq!(paging(Some(3), Some(20)), (3, 20, 40));
        assert_eq!(paging(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(paging(Some(2), Some(0)), (2, 1, 1));
        assert_eq!(paging(Some(u64::MAX), Some(100)), (u64::MAX, 100, u64::MAX));
    }
}
