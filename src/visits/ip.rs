//! Client IP extraction and visitor hashing
//!
//! The client address is taken from proxy headers only when the deployment
//! says a proxy is in front of us; otherwise the socket peer is authoritative.
//! Whatever address is chosen is hashed before it leaves the request handler.

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{TrustedProxyMode, VisitConfig};

type HmacSha256 = Hmac<Sha256>;

/// Pick the client address according to the trust configuration.
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &VisitConfig) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// RFC 7239 `Forwarded` first, then `X-Forwarded-For`.
fn extract_standard_ip(headers: &HeaderMap, config: &VisitConfig) -> Option<IpAddr> {
    let chain = forwarded_chain(headers).or_else(|| x_forwarded_for_chain(headers))?;
    pick_from_chain(&chain, config)
}

/// The `for=` addresses of a `Forwarded` header, client first.
fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (key, value) = param.trim().split_once('=')?;
                if !key.eq_ignore_ascii_case("for") {
                    return None;
                }
                parse_forwarded_node(value)
            })
        })
        .collect();

    (!chain.is_empty()).then_some(chain)
}

/// `for=192.0.2.60`, `for="192.0.2.60:4711"`, `for="[2001:db8::1]:4711"`
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let node = value.trim().trim_matches('"');
    if let Some(rest) = node.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = node.parse::<IpAddr>() {
        return Some(ip);
    }
    // IPv4 with port
    node.rsplit_once(':').and_then(|(host, _)| host.parse().ok())
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;
    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();
    (!chain.is_empty()).then_some(chain)
}

/// Walk the chain right to left, skipping hops we trust.
fn pick_from_chain(chain: &[IpAddr], config: &VisitConfig) -> Option<IpAddr> {
    if let Some(num_trusted) = config.num_trusted_proxies {
        if chain.len() > num_trusted {
            return Some(chain[chain.len() - num_trusted - 1]);
        }
        // Shorter than the configured proxy depth: the leftmost entry is all we have
        return chain.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

/// Keyed hash of a client address: HMAC-SHA256 with the configured salt,
/// base64url without padding. Stable for a given salt, irreversible without it.
pub fn hash_ip(ip: IpAddr, salt: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())?;
    mac.update(ip.to_string().as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}
