/// Minimal cookie carrier for session transport.
///
/// Only the attributes the session layer needs; full cookie handling is an
/// external collaborator's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    max_age: Option<i64>,
    path: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: None,
        }
    }

    /// An immediately-expiring cookie, used to clear a session id on the
    /// client.
    pub fn expired(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            max_age: Some(0),
            path: None,
        }
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renders the cookie as a `Set-Cookie` header value.
    pub fn render(&self) -> String {
        let mut rendered = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            rendered.push_str("; Max-Age=");
            rendered.push_str(&max_age.to_string());
        }
        if let Some(path) = &self.path {
            rendered.push_str("; Path=");
            rendered.push_str(path);
        }
        rendered
    }

    /// Looks a cookie value up in a request `Cookie` header
    /// (`name=value; other=value`). Pairs without `=` are skipped.
    pub fn find(header: &str, name: &str) -> Option<String> {
        header.split(';').find_map(|pair| {
            let (n, v) = pair.trim().split_once('=')?;
            (n == name).then(|| v.to_string())
        })
    }
}
