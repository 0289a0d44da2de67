use url::Url;

/// URL patterns that describe this application's own image proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRules {
    /// Origins whose proxied image URLs are rewritten to root-relative paths.
    pub rewrite_origins: Vec<String>,
    /// Any `localhost` origin is rewritten as well, whatever the port.
    pub rewrite_any_localhost: bool,
    /// Path prefix of the app's reverse-proxy route.
    pub proxy_prefix: String,
    /// Path fragment of images served directly from extracted archives.
    pub archive_fragment: String,
    /// Image URLs whose load errors never escalate.
    pub exempt_error_patterns: Vec<String>,
}

impl Default for ProxyRules {
    fn default() -> Self {
        Self {
            rewrite_origins: vec![
                "https://yanis-mail.fr".to_owned(),
                "http://yanis-mail.fr".to_owned(),
                "http://localhost:3000".to_owned(),
                "https://localhost:3000".to_owned(),
            ],
            rewrite_any_localhost: true,
            proxy_prefix: "/api/proxy/".to_owned(),
            archive_fragment: "/cbr/".to_owned(),
            exempt_error_patterns: vec![
                "localhost/api/proxy/proxy-image".to_owned(),
                "localhost:3000/api/proxy/".to_owned(),
            ],
        }
    }
}

impl ProxyRules {
    /// Turns an absolute proxied image URL into a root-relative path.
    ///
    /// URLs on other hosts, or outside the proxy prefix, are returned unchanged.
    pub fn rewrite_image_url(&self, raw: &str) -> String {
        let Ok(url) = Url::parse(raw) else {
            return raw.to_owned();
        };
        if !url.path().starts_with(&self.proxy_prefix) {
            return raw.to_owned();
        }

        let origin = url.origin().ascii_serialization();
        let known = self
            .rewrite_origins
            .iter()
            .any(|candidate| candidate.trim_end_matches('/') == origin);
        let localhost = self.rewrite_any_localhost && url.host_str() == Some("localhost");
        if !known && !localhost {
            return raw.to_owned();
        }

        match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        }
    }

    pub fn rewrite_all(&self, images: &[String]) -> Vec<String> {
        images
            .iter()
            .map(|image| self.rewrite_image_url(image))
            .collect()
    }

    /// Only archive pages and remote proxied images are worth warming.
    pub fn is_prefetchable(&self, src: &str) -> bool {
        src.contains(&self.archive_fragment)
            || (src.contains(&self.proxy_prefix) && !src.contains("localhost"))
    }

    /// Retried images must live under one of the app's image routes.
    pub fn is_retryable(&self, src: &str) -> bool {
        src.contains(&self.archive_fragment) || src.contains(&self.proxy_prefix)
    }

    pub fn is_error_exempt(&self, src: &str) -> bool {
        self.exempt_error_patterns
            .iter()
            .any(|pattern| src.contains(pattern.as_str()))
    }

    /// Builds the cache-busting URL for the `attempt`-th retry of `src`.
    pub fn retry_url(&self, src: &str, attempt: u32) -> String {
        let mut base = src.to_owned();
        if base.contains("localhost")
            && let Some(start) = base.find(&self.proxy_prefix)
        {
            base = base[start..].to_owned();
        }

        if let Ok(mut url) = Url::parse(&base) {
            url.query_pairs_mut()
                .append_pair("retry", &attempt.to_string());
            return url.to_string();
        }
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}retry={attempt}")
    }
}

#[cfg(test)]
mod tests {
    use super::ProxyRules;

    #[test]
    fn rewrites_production_and_dev_hosts() {
        let rules = ProxyRules::default();
        assert_eq!(
            rules.rewrite_image_url("https://yanis-mail.fr/api/proxy/abc/001.jpg"),
            "/api/proxy/abc/001.jpg"
        );
        assert_eq!(
            rules.rewrite_image_url("http://yanis-mail.fr/api/proxy/abc/002.jpg"),
            "/api/proxy/abc/002.jpg"
        );
        assert_eq!(
            rules.rewrite_image_url("http://localhost:3000/api/proxy/abc/003.jpg?w=2"),
            "/api/proxy/abc/003.jpg?w=2"
        );
        assert_eq!(
            rules.rewrite_image_url("http://localhost:5173/api/proxy/abc/004.jpg"),
            "/api/proxy/abc/004.jpg"
        );
    }

    #[test]
    fn leaves_foreign_and_relative_urls_alone() {
        let rules = ProxyRules::default();
        assert_eq!(
            rules.rewrite_image_url("https://cdn.example.com/api/proxy/a.jpg"),
            "https://cdn.example.com/api/proxy/a.jpg"
        );
        assert_eq!(
            rules.rewrite_image_url("https://yanis-mail.fr/cbr/a.jpg"),
            "https://yanis-mail.fr/cbr/a.jpg"
        );
        assert_eq!(rules.rewrite_image_url("/cbr/t1/001.jpg"), "/cbr/t1/001.jpg");
    }

    #[test]
    fn prefetch_skips_local_and_unrelated_assets() {
        let rules = ProxyRules::default();
        assert!(rules.is_prefetchable("/cbr/t1/001.jpg"));
        assert!(rules.is_prefetchable("/api/proxy/t1/001.jpg"));
        assert!(!rules.is_prefetchable("http://localhost:3000/api/proxy/t1/001.jpg"));
        assert!(!rules.is_prefetchable("/static/logo.png"));
    }

    #[test]
    fn retry_url_appends_attempt_and_strips_localhost() {
        let rules = ProxyRules::default();
        assert_eq!(
            rules.retry_url("/api/proxy/t1/001.jpg", 1),
            "/api/proxy/t1/001.jpg?retry=1"
        );
        assert_eq!(
            rules.retry_url("/api/proxy/t1/001.jpg?w=2", 2),
            "/api/proxy/t1/001.jpg?w=2&retry=2"
        );
        assert_eq!(
            rules.retry_url("http://localhost:8080/api/proxy/t1/001.jpg", 1),
            "/api/proxy/t1/001.jpg?retry=1"
        );
        assert_eq!(
            rules.retry_url("https://yanis-mail.fr/cbr/t1/001.jpg", 2),
            "https://yanis-mail.fr/cbr/t1/001.jpg?retry=2"
        );
    }

    #[test]
    fn dev_proxy_errors_are_exempt() {
        let rules = ProxyRules::default();
        assert!(rules.is_error_exempt("http://localhost:3000/api/proxy/t1/001.jpg"));
        assert!(!rules.is_error_exempt("/api/proxy/t1/001.jpg"));
    }
}
