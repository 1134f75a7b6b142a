//! Browser-side persistence seams.
//!
//! The login handshake and the session store keep their state in the
//! browser: string keys in session storage and cookies scoped to the base
//! domain. These traits let the same code run against a real browser bridge
//! or the in-memory stand-ins below.

use axum_extra::extract::cookie::Cookie;
use dashmap::DashMap;

pub trait BrowserStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

pub trait CookieStore: Send + Sync {
    fn get(&self, name: &str) -> Option<Cookie<'static>>;
    fn set(&self, cookie: Cookie<'static>);
    fn remove(&self, name: &str);
}

/// Where the browser should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub location: String,
}

impl Navigation {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BrowserStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[derive(Default)]
pub struct MemoryCookies {
    cookies: DashMap<String, Cookie<'static>>,
}

impl MemoryCookies {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookies {
    fn get(&self, name: &str) -> Option<Cookie<'static>> {
        self.cookies.get(name).map(|c| c.value().clone())
    }

    fn set(&self, cookie: Cookie<'static>) {
        self.cookies.insert(cookie.name().to_string(), cookie);
    }

    fn remove(&self, name: &str) {
        self.cookies.remove(name);
    }
}
