//! Catch-all `GET *`: static assets and the SPA entry document

use hyper::body::Bytes;
use hyper::header::{CACHE_CONTROL, ETAG};
use hyper::{Method, StatusCode};

use crate::error::AppError;
use crate::http::cache::{self, CachePolicy};
use crate::neutral::{NeutralRequest, NeutralResponse};
use crate::services::{Asset, AssetResolver};

const ASSET_MAX_AGE: u32 = 3600;

pub async fn handle_spa_fallback(
    req: &NeutralRequest,
    res: &mut NeutralResponse,
    assets: &dyn AssetResolver,
) -> Result<(), AppError> {
    let is_head = req.method() == Method::HEAD;
    if !is_head && req.method() != Method::GET {
        return Err(AppError::NotFound {
            path: req.path().to_string(),
        });
    }

    // Client-side routes have no file of their own and get the entry document
    let (asset, policy) = match assets.resolve(req.path()) {
        Some(asset) => (asset, CachePolicy::Public(ASSET_MAX_AGE)),
        None => match assets.entry_document() {
            Some(entry) => (entry, CachePolicy::NoCache),
            None => {
                return Err(AppError::NotFound {
                    path: req.path().to_string(),
                })
            }
        },
    };

    send_asset(req, res, &asset, policy, is_head).await
}

async fn send_asset(
    req: &NeutralRequest,
    res: &mut NeutralResponse,
    asset: &Asset,
    policy: CachePolicy,
    is_head: bool,
) -> Result<(), AppError> {
    let data = tokio::fs::read(&asset.path).await?;
    let etag = cache::generate_etag(&data);

    res.set_header(ETAG.as_str(), &etag)?;
    res.set_header(CACHE_CONTROL.as_str(), &policy.to_header_value())?;

    if cache::check_etag_match(req.header("if-none-match"), &etag) {
        res.set_status(StatusCode::NOT_MODIFIED);
        return res.send_raw(Bytes::new(), asset.content_type);
    }

    let body = if is_head { Bytes::new() } else { Bytes::from(data) };
    res.send_raw(body, asset.content_type)
}
