//! The user-sync cookie: which bidder families have set a user id for this
//! browser, and whether the user opted out of syncing altogether.
//!
//! The wire form is base64(JSON) under a configurable cookie name. An absent
//! or undecodable cookie parses as the empty cookie, never an error.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::HeaderMap;
use http::header::COOKIE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_COOKIE_NAME: &str = "uids";

const COOKIE_MAX_AGE_SECS: u64 = 180 * 24 * 60 * 60;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserSyncCookie {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    uids: HashMap<String, String>,
    #[serde(default, rename = "optout", skip_serializing_if = "std::ops::Not::not")]
    opt_out: bool,
}

impl UserSyncCookie {
    /// Extracts and decodes the sync cookie from the request headers.
    pub fn parse_from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == cookie_name).then_some(value)
            })
            .find_map(Self::decode)
            .unwrap_or_default()
    }

    fn decode(value: &str) -> Option<Self> {
        let bytes = BASE64.decode(value).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// False iff the user opted out of all syncing.
    pub fn allow_syncs(&self) -> bool {
        !self.opt_out
    }

    pub fn live_sync_count(&self) -> usize {
        self.uids.values().filter(|uid| !uid.is_empty()).count()
    }

    pub fn has_live_sync(&self, family: &str) -> bool {
        self.uids.get(family).is_some_and(|uid| !uid.is_empty())
    }

    pub fn uid(&self, family: &str) -> Option<&str> {
        self.uids
            .get(family)
            .map(String::as_str)
            .filter(|uid| !uid.is_empty())
    }

    /// Records a sync for `family`; an empty uid removes the entry.
    pub fn set_uid(&mut self, family: &str, uid: &str) {
        if uid.is_empty() {
            self.uids.remove(family);
        } else {
            self.uids.insert(family.to_string(), uid.to_string());
        }
    }

    /// Opting out wipes existing syncs so stale ids cannot leak back in.
    pub fn set_opt_out(&mut self, opt_out: bool) {
        self.opt_out = opt_out;
        if opt_out {
            self.uids.clear();
        }
    }

    pub fn uids(&self) -> &HashMap<String, String> {
        &self.uids
    }

    /// Serializes to a `Set-Cookie` header value for the configured domain.
    pub fn to_set_cookie(&self, cookie_name: &str, domain: &str) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let encoded = BASE64.encode(json);
        let mut cookie = format!("{cookie_name}={encoded}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}");
        if !domain.is_empty() {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie
    }
}
