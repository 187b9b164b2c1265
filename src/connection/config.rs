use crate::core::{KvError, Result};

const SCHEMES: [&str; 2] = ["redis://", "rediss://"];

/// Store connection configuration
///
/// Similar to Redis client connection strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`
    pub url: String,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Logical database index
    pub db: Option<u32>,

    host: String,
    port: Option<u16>,
}

impl ConnectionConfig {
    /// Create a configuration from a URL, validating it
    ///
    /// Credentials and the database index embedded in the URL are picked up
    /// unless set explicitly afterwards.
    pub fn new(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(KvError::invalid_config("Connection URL is required"));
        }

        let rest = SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or_else(|| {
                KvError::invalid_config("URL must start with 'redis://' or 'rediss://'")
                    .with_detail("url", redact(url))
            })?;

        // [user[:pass]@]host[:port][/db]
        let (auth, location) = match rest.rsplit_once('@') {
            Some((auth, location)) => (Some(auth), location),
            None => (None, rest),
        };

        let (host_port, db) = match location.split_once('/') {
            Some((host_port, "")) => (host_port, None),
            Some((host_port, db)) => {
                let db = db
                    .parse::<u32>()
                    .map_err(|_| KvError::invalid_config(format!("Invalid database index '{}'", db)))?;
                (host_port, Some(db))
            }
            None => (location, None),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| KvError::invalid_config(format!("Invalid port '{}'", port)))?;
                (host, Some(port))
            }
            None => (host_port, None),
        };

        if host.is_empty() {
            return Err(KvError::invalid_config("URL host cannot be empty")
                .with_detail("url", redact(url)));
        }

        let (username, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (non_empty(user), non_empty(pass)),
                None => (non_empty(auth), None),
            },
            None => (None, None),
        };

        Ok(Self {
            url: url.to_string(),
            username,
            password,
            db,
            host: host.to_string(),
            port,
        })
    }

    /// Alias for [`ConnectionConfig::new`]
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(url)
    }

    /// Load from `REDIS_URL`, `REDIS_USERNAME`, `REDIS_PASSWORD` and `REDIS_DB`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ConnectionConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("REDIS_URL")
            .ok_or_else(|| KvError::invalid_config("REDIS_URL is not set"))?;
        let mut config = Self::new(&url)?;

        if let Some(username) = lookup("REDIS_USERNAME").filter(|v| !v.is_empty()) {
            config = config.username(&username);
        }
        if let Some(password) = lookup("REDIS_PASSWORD").filter(|v| !v.is_empty()) {
            config = config.password(&password);
        }
        if let Some(db) = lookup("REDIS_DB").filter(|v| !v.is_empty()) {
            let db = db
                .parse::<u32>()
                .map_err(|_| KvError::invalid_config(format!("Invalid REDIS_DB '{}'", db)))?;
            config = config.db(db);
        }

        Ok(config)
    }

    /// Set the username
    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    /// Set the password
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Set the database index
    pub fn db(mut self, db: u32) -> Self {
        self.db = Some(db);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port from the URL, 6379 when absent
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(6379)
    }

    /// Convert to a connection string with the password hidden
    pub fn to_url(&self) -> String {
        let scheme = if self.url.starts_with("rediss://") {
            "rediss://"
        } else {
            "redis://"
        };
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{}:***@", user),
            (None, Some(_)) => ":***@".to_string(),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        let db = self.db.map(|db| format!("/{}", db)).unwrap_or_default();

        format!("{}{}{}:{}{}", scheme, auth, self.host, self.port(), db)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn redact(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((_, location)) => format!("***@{}", location),
        None => url.to_string(),
    }
}
