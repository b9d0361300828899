//! `pageToken` continuation shared by the list endpoints

use std::future::Future;

use url::Url;

use crate::Result;

const PAGE_TOKEN_PARAM: &str = "pageToken";

/// One page of a list response
pub trait Page {
    type Item;

    /// Items of this page and the token of the next one, if any
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

/// Fetch every page starting at `base`, following `nextPageToken` until the
/// server stops returning one. An empty token ends the walk.
pub async fn collect_pages<P, F, Fut>(base: &Url, mut fetch: F) -> Result<Vec<P::Item>>
where
    P: Page,
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut url = base.clone();
        if let Some(token) = &page_token {
            url.query_pairs_mut().append_pair(PAGE_TOKEN_PARAM, token);
        }
        let (page, next) = fetch(url).await?.into_parts();
        items.extend(page);

        match next {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => return Ok(items),
        }
    }
}
