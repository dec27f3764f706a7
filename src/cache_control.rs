//! Cache-Control parser: extracts the handful of request directives the pipeline acts on.
//! Unknown tokens are ignored; a malformed `max-age` is treated as absent.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequestDirectives {
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age: Option<u64>,
}

impl RequestDirectives {
    pub fn parse(header_value: Option<&str>) -> Self {
        let Some(value) = header_value else {
            return Self::default();
        };

        let mut directives = Self::default();
        for token in value.split(',') {
            let token = token.trim();
            if token.eq_ignore_ascii_case("no-store") {
                directives.no_store = true;
            } else if token.eq_ignore_ascii_case("no-cache") {
                directives.no_cache = true;
            } else if let Some(rest) = token
                .split_once('=')
                .filter(|(name, _)| name.trim().eq_ignore_ascii_case("max-age"))
                .map(|(_, v)| v.trim())
            {
                if let Ok(seconds) = rest.parse::<u64>() {
                    directives.max_age = Some(seconds);
                }
            }
        }
        directives
    }
}
