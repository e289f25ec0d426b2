//! Wire shapes returned by the news proxy and the normalized forms handed to
//! consumers.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FetchError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "gif", "svg"];

/// `{status, results, totalResults, nextPage}` or `{error}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status: Option<String>,
    pub results: Option<Vec<RawArticle>>,
    pub total_results: Option<u64>,
    pub next_page: Option<PageToken>,
    pub error: Option<String>,
}

impl ApiResponse {
    /// Reject error payloads and anything whose status is not `"success"`.
    pub fn into_success(self) -> Result<Self, FetchError> {
        if let Some(message) = self.error {
            return Err(FetchError::Api(message));
        }
        if self.status.as_deref() != Some("success") {
            return Err(FetchError::Status(self.status));
        }
        Ok(self)
    }
}

/// Opaque pagination token. The upstream sends strings, some mirrors send
/// numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PageToken {
    Text(String),
    Number(u64),
}

impl PageToken {
    /// The token as sent back upstream. Blank and zero tokens mark the last
    /// page, so they yield `None`.
    pub fn into_token(self) -> Option<String> {
        match self {
            PageToken::Text(text) if text.trim().is_empty() => None,
            PageToken::Text(text) => Some(text),
            PageToken::Number(0) => None,
            PageToken::Number(number) => Some(number.to_string()),
        }
    }
}

/// Either one author or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Creator {
    One(String),
    Many(Vec<String>),
}

/// An article as the API sends it. Only `title` decides whether it survives.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub source_name: Option<String>,
    pub source_icon: Option<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: Option<String>,
    pub category: Option<Vec<String>>,
    pub creator: Option<Creator>,
    pub duplicate: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_url: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_icon: Option<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of headlines as consumers see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlinesPage {
    pub articles: Vec<NormalizedArticle>,
    pub total_results: u64,
    pub has_more: bool,
    /// Token that leads to the page after this one
    #[serde(skip)]
    pub next_page: Option<String>,
    /// Token this page was requested with, `None` for a first page
    #[serde(skip)]
    pub token: Option<String>,
}

impl HeadlinesPage {
    pub fn from_response(response: ApiResponse, placeholder: &str) -> Result<Self, FetchError> {
        let response = response.into_success()?;
        let results = response.results.ok_or(FetchError::MissingField("results"))?;
        let next_page = response.next_page.and_then(PageToken::into_token);

        Ok(Self {
            articles: normalize_articles(results, placeholder),
            total_results: response.total_results.unwrap_or_default(),
            has_more: next_page.is_some(),
            next_page,
            token: None,
        })
    }
}

/// True when `url` is absolute and its path names an image file.
pub fn is_valid_image_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();
    path.rsplit_once('.')
        .map(|(_, extension)| IMAGE_EXTENSIONS.contains(&extension))
        .unwrap_or(false)
}

/// Drop untitled articles and swap unusable image URLs for `placeholder`.
pub fn normalize_articles(raw: Vec<RawArticle>, placeholder: &str) -> Vec<NormalizedArticle> {
    raw.into_iter()
        .filter_map(|article| normalize_article(article, placeholder))
        .collect()
}

pub fn normalize_article(raw: RawArticle, placeholder: &str) -> Option<NormalizedArticle> {
    let title = raw.title.filter(|title| !title.is_empty())?;
    let image_url = match raw.image_url {
        Some(url) if is_valid_image_url(&url) => url,
        _ => placeholder.to_string(),
    };

    Some(NormalizedArticle {
        title,
        description: raw.description,
        image_url,
        link: raw.link.unwrap_or_default(),
        source_name: raw.source_name,
        source_icon: raw.source_icon,
        pub_date: raw.pub_date.unwrap_or_default(),
        category: raw.category,
        creator: raw.creator,
        duplicate: raw.duplicate,
        extra: raw.extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLACEHOLDER: &str = "/images/placeholder.png";

    fn raw(value: Value) -> RawArticle {
        serde_json::from_value(value).unwrap()
    }

    mod image_url_tests {
        use super::*;

        #[test]
        fn test_accepts_known_extensions() {
            for url in [
                "http://x/y.jpg",
                "https://cdn.example.com/a/b.jpeg",
                "https://cdn.example.com/a.webp",
                "https://cdn.example.com/a.avif",
                "https://cdn.example.com/a.gif",
                "https://cdn.example.com/logo.svg",
            ] {
                assert!(is_valid_image_url(url), "{} should be valid", url);
            }
        }

        #[test]
        fn test_extension_is_case_insensitive() {
            assert!(is_valid_image_url("http://x/y.PNG"));
            assert!(is_valid_image_url("http://x/y.JpEg"));
        }

        #[test]
        fn test_rejects_other_extensions() {
            assert!(!is_valid_image_url("http://x/y.bmp"));
            assert!(!is_valid_image_url("http://x/y.html"));
            assert!(!is_valid_image_url("http://x/image"));
        }

        #[test]
        fn test_rejects_relative_and_garbage() {
            assert!(!is_valid_image_url("/images/a.png"));
            assert!(!is_valid_image_url("not a url"));
            assert!(!is_valid_image_url(""));
        }

        #[test]
        fn test_query_string_does_not_hide_extension() {
            assert!(is_valid_image_url("https://cdn.example.com/a.png?w=300"));
            assert!(!is_valid_image_url("https://cdn.example.com/resize?src=a.png"));
        }
    }

    mod normalize_tests {
        use super::*;

        #[test]
        fn test_bmp_is_replaced_with_placeholder() {
            let article = normalize_article(
                raw(json!({"title": "T", "image_url": "http://x/y.bmp"})),
                PLACEHOLDER,
            )
            .unwrap();
            assert_eq!(article.image_url, PLACEHOLDER);
        }

        #[test]
        fn test_uppercase_png_is_preserved() {
            let article = normalize_article(
                raw(json!({"title": "T", "image_url": "http://x/y.PNG"})),
                PLACEHOLDER,
            )
            .unwrap();
            assert_eq!(article.image_url, "http://x/y.PNG");
        }

        #[test]
        fn test_missing_and_null_image_get_placeholder() {
            let missing = normalize_article(raw(json!({"title": "T"})), PLACEHOLDER).unwrap();
            let null = normalize_article(raw(json!({"title": "T", "image_url": null})), PLACEHOLDER)
                .unwrap();
            assert_eq!(missing.image_url, PLACEHOLDER);
            assert_eq!(null.image_url, PLACEHOLDER);
        }

        #[test]
        fn test_untitled_articles_are_dropped() {
            let articles = normalize_articles(
                vec![
                    raw(json!({"title": "Kept"})),
                    raw(json!({"description": "no title"})),
                    raw(json!({"title": null})),
                    raw(json!({"title": ""})),
                ],
                PLACEHOLDER,
            );
            assert_eq!(articles.len(), 1);
            assert_eq!(articles[0].title, "Kept");
        }

        #[test]
        fn test_order_is_preserved() {
            let articles = normalize_articles(
                vec![
                    raw(json!({"title": "First"})),
                    raw(json!({"title": "Second"})),
                    raw(json!({"title": "Third"})),
                ],
                PLACEHOLDER,
            );
            let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
            assert_eq!(titles, vec!["First", "Second", "Third"]);
        }

        #[test]
        fn test_unknown_fields_are_kept() {
            let article = normalize_article(
                raw(json!({"title": "T", "article_id": "abc", "country": ["in"]})),
                PLACEHOLDER,
            )
            .unwrap();
            assert_eq!(article.extra.get("article_id"), Some(&json!("abc")));

            let out = serde_json::to_value(&article).unwrap();
            assert_eq!(out["article_id"], "abc");
            assert_eq!(out["country"], json!(["in"]));
        }

        #[test]
        fn test_creator_accepts_string_or_list() {
            let one = raw(json!({"title": "T", "creator": "Ann"}));
            let many = raw(json!({"title": "T", "creator": ["Ann", "Bo"]}));
            assert_eq!(one.creator, Some(Creator::One("Ann".to_string())));
            assert_eq!(
                many.creator,
                Some(Creator::Many(vec!["Ann".to_string(), "Bo".to_string()]))
            );
        }

        #[test]
        fn test_serialized_field_names() {
            let article = normalize_article(
                raw(json!({"title": "T", "pubDate": "2024-12-09 12:00:00", "link": "https://a"})),
                PLACEHOLDER,
            )
            .unwrap();
            let out = serde_json::to_value(&article).unwrap();
            assert_eq!(out["pubDate"], "2024-12-09 12:00:00");
            assert_eq!(out["image_url"], PLACEHOLDER);
            assert!(out.get("description").is_none());
        }
    }

    mod response_tests {
        use super::*;

        fn response(value: Value) -> ApiResponse {
            serde_json::from_value(value).unwrap()
        }

        #[test]
        fn test_success_page() {
            let page = HeadlinesPage::from_response(
                response(json!({
                    "status": "success",
                    "totalResults": 100,
                    "results": [{"title": "A"}, {"description": "dropped"}],
                    "nextPage": "abc"
                })),
                PLACEHOLDER,
            )
            .unwrap();

            assert_eq!(page.articles.len(), 1);
            assert_eq!(page.total_results, 100);
            assert!(page.has_more);
            assert_eq!(page.next_page.as_deref(), Some("abc"));
        }

        #[test]
        fn test_last_page_has_no_more() {
            let page = HeadlinesPage::from_response(
                response(json!({"status": "success", "results": [], "nextPage": null})),
                PLACEHOLDER,
            )
            .unwrap();
            assert!(!page.has_more);
            assert_eq!(page.total_results, 0);
        }

        #[test]
        fn test_numeric_page_token() {
            let page = HeadlinesPage::from_response(
                response(json!({"status": "success", "results": [], "nextPage": 17})),
                PLACEHOLDER,
            )
            .unwrap();
            assert_eq!(page.next_page.as_deref(), Some("17"));
        }

        #[test]
        fn test_empty_page_token_means_last_page() {
            for token in [json!(""), json!("  "), json!(0)] {
                let page = HeadlinesPage::from_response(
                    response(json!({"status": "success", "results": [], "nextPage": token})),
                    PLACEHOLDER,
                )
                .unwrap();
                assert!(!page.has_more, "token {} should end the listing", token);
                assert_eq!(page.next_page, None);
            }
        }

        #[test]
        fn test_error_payload() {
            let result = HeadlinesPage::from_response(
                response(json!({"error": "Failed to fetch news"})),
                PLACEHOLDER,
            );
            assert!(matches!(result, Err(FetchError::Api(message)) if message == "Failed to fetch news"));
        }

        #[test]
        fn test_non_success_status() {
            let result = HeadlinesPage::from_response(
                response(json!({"status": "error", "results": []})),
                PLACEHOLDER,
            );
            assert!(matches!(result, Err(FetchError::Status(Some(s))) if s == "error"));
        }

        #[test]
        fn test_missing_results() {
            let result =
                HeadlinesPage::from_response(response(json!({"status": "success"})), PLACEHOLDER);
            assert!(matches!(result, Err(FetchError::MissingField("results"))));
        }

        #[test]
        fn test_page_serializes_camel_case_without_token() {
            let page = HeadlinesPage {
                articles: vec![],
                total_results: 3,
                has_more: true,
                next_page: Some("abc".to_string()),
                token: Some("xyz".to_string()),
            };
            let out = serde_json::to_value(&page).unwrap();
            assert_eq!(out, json!({"articles": [], "totalResults": 3, "hasMore": true}));
        }
    }
}
