//! Response header helpers: entity alerts, failure alerts, and pagination.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use campus_core::Page;

/// Builds the `X-{app}-*` headers attached to write responses and client errors.
#[derive(Debug, Clone)]
pub struct HeaderUtil {
    app_name: Arc<str>,
}

impl HeaderUtil {
    pub fn new(app_name: impl Into<Arc<str>>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// `X-{app}-alert: {app}.{entity}.{action}` and `X-{app}-params: {param}`.
    pub fn alert(&self, entity: &str, action: &str, param: impl ToString) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let message = format!("{}.{}.{}", self.app_name, entity, action);
        insert(&mut headers, &format!("X-{}-alert", self.app_name), &message);
        insert(&mut headers, &format!("X-{}-params", self.app_name), &param.to_string());
        headers
    }

    pub fn created(&self, entity: &str, id: impl ToString) -> HeaderMap {
        self.alert(entity, "created", id)
    }

    pub fn updated(&self, entity: &str, id: impl ToString) -> HeaderMap {
        self.alert(entity, "updated", id)
    }

    pub fn deleted(&self, entity: &str, id: impl ToString) -> HeaderMap {
        self.alert(entity, "deleted", id)
    }

    /// `X-{app}-error: error.{key}` and `X-{app}-params: {entity}`.
    pub fn failure(&self, entity: &str, error_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, &format!("X-{}-error", self.app_name), &format!("error.{error_key}"));
        insert(&mut headers, &format!("X-{}-params", self.app_name), entity);
        headers
    }
}

/// `X-Total-Count` plus a `Link` header with next/prev (when they exist), last and first.
///
/// `query` is echoed first in every link (search endpoints).
pub fn pagination<T>(base: &str, query: Option<&str>, page: &Page<T>) -> HeaderMap {
    let number = u64::from(page.number());
    let size = page.size();
    let last = page.total_pages().saturating_sub(1);

    let link = |p: u64, rel: &str| {
        let query = query.map(|q| format!("query={}&", encode_query_value(q))).unwrap_or_default();
        format!("<{base}?{query}page={p}&size={size}>; rel=\"{rel}\"")
    };

    let mut links = Vec::with_capacity(4);
    if page.has_next() {
        links.push(link(number + 1, "next"));
    }
    if page.has_previous() {
        links.push(link(number - 1, "prev"));
    }
    links.push(link(last, "last"));
    links.push(link(0, "first"));

    let mut headers = HeaderMap::new();
    insert(&mut headers, "X-Total-Count", &page.total.to_string());
    insert(&mut headers, "Link", &links.join(","));
    headers
}

/// Form-encode a query-string value (`application/x-www-form-urlencoded`, space as `+`).
pub fn encode_query_value(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::warn!(header = name, "dropping header that is not representable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::PageRequest;

    fn page(total: u64, page: u32, size: u32) -> Page<()> {
        Page::new(Vec::new(), total, PageRequest::new(Some(page), Some(size)))
    }

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
        headers.get(name).unwrap().to_str().unwrap()
    }

    #[test]
    fn alerts_use_app_prefix() {
        let util = HeaderUtil::new("campusApp");
        let headers = util.created("building", 42);
        assert_eq!(header(&headers, "x-campusapp-alert"), "campusApp.building.created");
        assert_eq!(header(&headers, "x-campusapp-params"), "42");

        let headers = util.failure("building", "idexists");
        assert_eq!(header(&headers, "x-campusapp-error"), "error.idexists");
        assert_eq!(header(&headers, "x-campusapp-params"), "building");
    }

    #[test]
    fn middle_page_links_all_directions() {
        let headers = pagination("/api/buildings", None, &page(5, 1, 2));
        assert_eq!(header(&headers, "x-total-count"), "5");
        assert_eq!(
            header(&headers, "link"),
            "</api/buildings?page=2&size=2>; rel=\"next\",\
             </api/buildings?page=0&size=2>; rel=\"prev\",\
             </api/buildings?page=2&size=2>; rel=\"last\",\
             </api/buildings?page=0&size=2>; rel=\"first\""
        );
    }

    #[test]
    fn empty_result_links_to_page_zero_only() {
        let headers = pagination("/api/infos", None, &page(0, 0, 20));
        let link = header(&headers, "link");
        assert!(!link.contains("rel=\"next\""));
        assert!(!link.contains("rel=\"prev\""));
        assert!(link.contains("</api/infos?page=0&size=20>; rel=\"last\""));
    }

    #[test]
    fn search_links_echo_encoded_query_first() {
        let headers = pagination("/api/_search/buildings", Some("name:hall a"), &page(1, 0, 20));
        assert!(header(&headers, "link").starts_with("</api/_search/buildings?query=name%3Ahall+a&page=0&size=20>"));
    }

    #[test]
    fn encodes_reserved_and_multibyte() {
        assert_eq!(encode_query_value("a-b_c.d*e"), "a-b_c.d*e");
        assert_eq!(encode_query_value("x&y=z"), "x%26y%3Dz");
        assert_eq!(encode_query_value("a+b c"), "a%2Bb+c");
        assert_eq!(encode_query_value("(hall)"), "%28hall%29");
        assert_eq!(encode_query_value("é"), "%C3%A9");
    }
}
