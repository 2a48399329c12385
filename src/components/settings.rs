//! # Component settings.
//!
//! [`Settings`] is a small table of named settings, each holding an ordered
//! list of legal options and the currently selected one. Change requests are
//! validated against the options legal *at the time of the request*: a
//! component's `update()` may replace the legal list (hot reload), after which
//! a previously valid choice is rejected.
//!
//! ## Rules
//! - Rejected changes leave the current option untouched.
//! - Replacing the legal list keeps the current option even when it is no
//!   longer listed; only new change requests are validated.

use parking_lot::RwLock;

use crate::error::SettingError;

#[derive(Clone, Debug)]
struct Setting {
    name: String,
    options: Vec<String>,
    current: String,
}

/// Named settings with enumerated legal options.
///
/// ## Example
/// ```rust
/// use stepvisor::Settings;
///
/// let settings = Settings::new()
///     .with("mode", ["safe", "fast"], "safe");
///
/// assert!(settings.change("mode", "fast").is_ok());
/// assert!(settings.change("mode", "turbo").is_err());
/// assert_eq!(settings.current("mode").as_deref(), Some("fast"));
/// ```
#[derive(Debug, Default)]
pub struct Settings {
    inner: RwLock<Vec<Setting>>,
}

impl Settings {
    /// Creates an empty settings table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a setting (builder style). Redeclaring a name replaces it.
    pub fn with<I, S>(self, name: &str, options: I, current: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declare(name, options, current);
        self
    }

    /// Declares a setting in place. Redeclaring a name replaces it.
    pub fn declare<I, S>(&self, name: &str, options: I, current: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let setting = Setting {
            name: name.to_string(),
            options: options.into_iter().map(Into::into).collect(),
            current: current.to_string(),
        };
        let mut inner = self.inner.write();
        match inner.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = setting,
            None => inner.push(setting),
        }
    }

    /// Applies `option` to `name` if it is currently legal.
    pub fn change(&self, name: &str, option: &str) -> Result<(), SettingError> {
        let mut inner = self.inner.write();
        let setting = inner
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| SettingError::UnknownSetting {
                setting: name.to_string(),
            })?;

        if !setting.options.iter().any(|o| o == option) {
            return Err(SettingError::IllegalOption {
                setting: name.to_string(),
                option: option.to_string(),
                legal: setting.options.clone(),
            });
        }
        setting.current = option.to_string();
        Ok(())
    }

    /// Replaces the legal options of `name`.
    pub fn set_options<I, S>(&self, name: &str, options: I) -> Result<(), SettingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.write();
        let setting = inner
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| SettingError::UnknownSetting {
                setting: name.to_string(),
            })?;
        setting.options = options.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Setting names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().iter().map(|s| s.name.clone()).collect()
    }

    /// Legal options of `name`.
    pub fn options(&self, name: &str) -> Option<Vec<String>> {
        self.inner
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.options.clone())
    }

    /// Currently selected option of `name`.
    pub fn current(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes() -> Settings {
        Settings::new()
            .with("mode", ["safe", "fast"], "safe")
            .with("level", ["1", "2", "3"], "2")
    }

    #[test]
    fn illegal_option_keeps_current() {
        let s = modes();
        let err = s.change("mode", "turbo").unwrap_err();
        assert_eq!(err.as_label(), "illegal_option");
        assert_eq!(s.current("mode").as_deref(), Some("safe"));
    }

    #[test]
    fn unknown_setting() {
        let s = modes();
        assert_eq!(
            s.change("color", "red"),
            Err(SettingError::UnknownSetting {
                setting: "color".into()
            })
        );
        assert!(s.set_options("color", ["red"]).is_err());
    }

    #[test]
    fn legality_follows_replaced_options() {
        let s = modes();
        assert!(s.change("mode", "fast").is_ok());

        s.set_options("mode", ["safe"]).unwrap();
        assert_eq!(s.current("mode").as_deref(), Some("fast"));
        assert!(s.change("mode", "fast").is_err());
        assert!(s.change("mode", "safe").is_ok());
    }

    #[test]
    fn introspection_keeps_declaration_order() {
        let s = modes();
        assert_eq!(s.names(), vec!["mode".to_string(), "level".to_string()]);
        assert_eq!(
            s.options("level"),
            Some(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
        assert_eq!(s.options("missing"), None);

        s.declare("level", ["9"], "9");
        assert_eq!(s.names().len(), 2);
        assert_eq!(s.current("level").as_deref(), Some("9"));
    }
}
