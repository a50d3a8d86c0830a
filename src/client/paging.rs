//! Draining paginated list endpoints.
//!
//! The POS numbers its pages and signals more via a `Link: <...>; rel="next"`
//! header; the invoicing API returns a `nextPage` continuation token in the body.

use crate::client::error::ApiError;
use log::{debug, warn};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenPage<T> {
    pub rows: Vec<T>,
    pub next_page: Option<String>,
}

/// Whether a `Link` header advertises a `rel="next"` target.
pub fn link_has_next(link: Option<&str>) -> bool {
    let Some(link) = link else {
        return false;
    };
    link.split(',').any(|part| {
        part.split(';').skip(1).any(|param| {
            let param = param.trim();
            matches!(param, "rel=\"next\"" | "rel=next")
        })
    })
}

/// Fetch pages 1, 2, ... until one says there is nothing more or comes back short.
pub fn drain_numbered_pages<T, F>(page_size: usize, mut fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(u32) -> Result<Page<T>, ApiError>,
{
    let mut all = Vec::new();
    let mut page = 1u32;
    loop {
        let Page { rows, has_more } = fetch(page)?;
        let short = rows.len() < page_size;
        debug!("Page {}: {} row(s), has_more={}", page, rows.len(), has_more);
        all.extend(rows);
        if !has_more || short {
            break;
        }
        page += 1;
    }
    Ok(all)
}

/// Follow continuation tokens until none is returned.
///
/// A token seen before ends the loop with a warning instead of spinning.
pub fn drain_token_pages<T, F>(mut fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(Option<&str>) -> Result<TokenPage<T>, ApiError>,
{
    let mut all = Vec::new();
    let mut seen = BTreeSet::new();
    let mut token: Option<String> = None;
    loop {
        let TokenPage { rows, next_page } = fetch(token.as_deref())?;
        debug!("Token page: {} row(s), next={}", rows.len(), next_page.as_deref().unwrap_or("-"));
        all.extend(rows);
        match next_page.filter(|t| !t.trim().is_empty()) {
            None => break,
            Some(next) => {
                if !seen.insert(next.clone()) {
                    warn!("Pagination token {} repeated; stopping after {} row(s)", next, all.len());
                    break;
                }
                token = Some(next);
            }
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_next_links() {
        assert!(link_has_next(Some(r#"<https://pos/orders?page=2>; rel="next""#)));
        assert!(link_has_next(Some(
            r#"<https://pos/orders?page=1>; rel="prev", <https://pos/orders?page=3>; rel="next""#
        )));
        assert!(!link_has_next(Some(r#"<https://pos/orders?page=1>; rel="prev""#)));
        assert!(!link_has_next(None));
    }

    #[test]
    fn numbered_pages_stop_without_next_link() {
        let mut requested = Vec::new();
        let rows = drain_numbered_pages(2, |page| {
            requested.push(page);
            Ok(Page {
                rows: vec![page * 10, page * 10 + 1],
                has_more: page < 3,
            })
        })
        .expect("drain");
        assert_eq!(requested, vec![1, 2, 3]);
        assert_eq!(rows, vec![10, 11, 20, 21, 30, 31]);
    }

    #[test]
    fn numbered_pages_stop_on_short_page() {
        let mut calls = 0;
        let rows = drain_numbered_pages(3, |page| {
            calls += 1;
            let rows = if page == 1 { vec![1, 2, 3] } else { vec![4] };
            Ok(Page { rows, has_more: true })
        })
        .expect("drain");
        assert_eq!(calls, 2);
        assert_eq!(rows, vec![1, 2, 3, 4]);
    }

    #[test]
    fn numbered_pages_propagate_errors() {
        let result: Result<Vec<u32>, ApiError> = drain_numbered_pages(1, |page| {
            if page == 2 {
                Err(ApiError::Transport("reset".into()))
            } else {
                Ok(Page { rows: vec![page], has_more: true })
            }
        });
        assert!(matches!(result, Err(ApiError::Transport(_))));
    }

    #[test]
    fn token_pages_follow_until_absent() {
        let rows = drain_token_pages(|token| {
            Ok(match token {
                None => TokenPage { rows: vec!["a"], next_page: Some("t1".into()) },
                Some("t1") => TokenPage { rows: vec!["b"], next_page: Some("t2".into()) },
                _ => TokenPage { rows: vec!["c"], next_page: None },
            })
        })
        .expect("drain");
        assert_eq!(rows, vec!["a", "b", "c"]);
    }

    #[test]
    fn repeated_token_ends_loop() {
        let mut calls = 0;
        let rows = drain_token_pages(|_| {
            calls += 1;
            Ok(TokenPage { rows: vec![calls], next_page: Some("same".into()) })
        })
        .expect("drain");
        assert_eq!(calls, 2);
        assert_eq!(rows, vec![1, 2]);
    }
}
