//! PayPal catalog products and billing plans (read-only).

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::FetchError;
use crate::fetch::{Auth, EndpointSpec, PaginatedFetcher, Pagination};
use crate::providers::{PresetError, endpoint_url};

const PAGE_SIZE: &str = "20";

/// Exchange the client credentials for a bearer token
/// (`POST /v1/oauth2/token`, `grant_type=client_credentials`).
pub async fn access_token(
    fetcher: &PaginatedFetcher,
    config: &AppConfig,
) -> Result<String, PresetError> {
    let auth = Auth::Basic {
        username: config.credentials.paypal_client_id()?.to_string(),
        password: Some(config.credentials.paypal_client_secret()?.to_string()),
    };
    let url = endpoint_url("paypal", &config.api_bases.paypal, "v1/oauth2/token")?;

    let response = fetcher
        .request_json("paypal", |client| {
            auth.apply(client.post(url.clone()))
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body("grant_type=client_credentials")
        })
        .await?;

    response
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            PresetError::Fetch(FetchError::malformed(
                "PayPal token response has no access_token",
            ))
        })
}

fn paginated(
    name: &str,
    config: &AppConfig,
    path: &str,
    items_pointer: &str,
    token: &str,
) -> Result<EndpointSpec, PresetError> {
    let url = endpoint_url("paypal", &config.api_bases.paypal, path)?;
    Ok(EndpointSpec::new(
        name,
        url,
        Pagination::page_number("page", 1, Some("/total_pages")),
    )
    .with_auth(Auth::Bearer(token.to_string()))
    .with_items_pointer(items_pointer)
    // An empty catalog omits the array entirely
    .with_optional_items()
    .with_max_pages(config.max_pages)
    .with_query("page_size", PAGE_SIZE)
    .with_query("total_required", "true"))
}

/// `GET /v1/catalogs/products`.
pub fn products(config: &AppConfig, token: &str) -> Result<EndpointSpec, PresetError> {
    paginated(
        "paypal-products",
        config,
        "v1/catalogs/products",
        "/products",
        token,
    )
}

/// `GET /v1/billing/plans`, optionally for one product.
pub fn plans(
    config: &AppConfig,
    token: &str,
    product_id: Option<&str>,
) -> Result<EndpointSpec, PresetError> {
    let spec = paginated("paypal-plans", config, "v1/billing/plans", "/plans", token)?;
    Ok(match product_id {
        Some(product_id) => spec.with_query("product_id", product_id),
        None => spec,
    })
}
