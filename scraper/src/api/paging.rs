use std::future::Future;

use crate::error::FetchError;

/// Items of one page and the cursor of the page after it.
#[derive(Debug)]
pub struct PageOf<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

impl<T, C> PageOf<T, C> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

#[derive(Debug)]
pub struct Walked<T> {
    pub items: Vec<T>,
    /// The source ran out of pages, as opposed to `wants_more` stopping the walk.
    pub exhausted: bool,
}

/// Fetches pages starting from `None` until there is no next cursor or
/// `wants_more` says the accumulated items are enough.
///
/// A failing page fails the whole walk.
pub async fn walk_pages<T, C, F, Fut, W>(
    mut fetch: F,
    mut wants_more: W,
) -> Result<Walked<T>, FetchError>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<PageOf<T, C>, FetchError>>,
    W: FnMut(&[T]) -> bool,
{
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        let page = fetch(cursor.take()).await?;
        items.extend(page.items);

        match page.next {
            None => {
                return Ok(Walked {
                    items,
                    exhausted: true,
                })
            }
            Some(_) if !wants_more(&items) => {
                return Ok(Walked {
                    items,
                    exhausted: false,
                })
            }
            next => cursor = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn pages() -> Vec<PageOf<u32, usize>> {
        vec![
            PageOf {
                items: vec![9, 8, 7],
                next: Some(1),
            },
            PageOf {
                items: vec![6, 5, 4],
                next: Some(2),
            },
            PageOf::last(vec![3, 2]),
        ]
    }

    #[tokio::test]
    async fn follows_cursors_until_exhausted() {
        let requested = &Mutex::new(Vec::new());
        let pages = &Mutex::new(pages().into_iter());

        let walked = walk_pages(
            move |cursor: Option<usize>| async move {
                requested.lock().unwrap().push(cursor);
                Ok::<_, FetchError>(pages.lock().unwrap().next().unwrap())
            },
            |_: &[u32]| true,
        )
        .await
        .unwrap();

        assert!(walked.exhausted);
        assert_eq!(walked.items, vec![9, 8, 7, 6, 5, 4, 3, 2]);
        assert_eq!(*requested.lock().unwrap(), vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn stops_once_enough_is_collected() {
        let requested = &Mutex::new(Vec::new());
        let pages = &Mutex::new(pages().into_iter());

        let walked = walk_pages(
            move |cursor: Option<usize>| async move {
                requested.lock().unwrap().push(cursor);
                Ok::<_, FetchError>(pages.lock().unwrap().next().unwrap())
            },
            |items: &[u32]| items.last().is_some_and(|&oldest| oldest > 5),
        )
        .await
        .unwrap();

        assert!(!walked.exhausted);
        assert_eq!(walked.items, vec![9, 8, 7, 6, 5, 4]);
        assert_eq!(requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_page_fails_the_walk() {
        let pages = &Mutex::new(pages().into_iter());

        let result = walk_pages(
            move |cursor: Option<usize>| async move {
                if cursor == Some(2) {
                    return Err(FetchError::Permanent("422 Unprocessable Entity".to_string()));
                }
                Ok::<_, FetchError>(pages.lock().unwrap().next().unwrap())
            },
            |_: &[u32]| true,
        )
        .await;

        assert!(matches!(result, Err(FetchError::Permanent(_))));
    }
}
