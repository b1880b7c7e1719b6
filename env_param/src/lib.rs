//! Global parameters initialized from environment variables.
//!
//! An [`EnvParam`] couples the name of an environment variable with the string
//! form of a default value. It is meant for knobs that should be tunable
//! without growing a command line surface: propagation modes, range factors,
//! internal limits of a checking algorithm.
//!
//! ```
//! use env_param::EnvParam;
//! static RANGE_FACTOR: EnvParam<f64> = EnvParam::new("TEMPNET_RANGE_FACTOR", "3.3");
//!
//! fn main() {
//!     // the environment variable is not set: the default applies
//!     assert_eq!(RANGE_FACTOR.get(), 3.3);
//! }
//! ```
//!
//! A parameter is resolved exactly once, on first access. If the environment
//! variable is set before that point, its value wins; later changes to the
//! environment are ignored. [`EnvParam::set`] forces a value programmatically
//! and panics if the parameter was already resolved.

use std::str::FromStr;

pub struct EnvParam<T> {
    value: once_cell::sync::OnceCell<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    /// Declares a parameter backed by the environment variable `env`, falling
    /// back to parsing `default` when the variable is absent.
    pub const fn new(env: &'static str, default: &'static str) -> EnvParam<T> {
        EnvParam {
            value: once_cell::sync::OnceCell::new(),
            env,
            default,
        }
    }

    /// Name of the backing environment variable.
    pub fn env_var(&self) -> &'static str {
        self.env
    }
}

impl<T: FromStr> EnvParam<T> {
    fn parsed_default(&self) -> T {
        match T::from_str(self.default) {
            Ok(v) => v,
            Err(_) => panic!("[env_param] {}: invalid default value \"{}\"", self.env, self.default),
        }
    }

    /// Returns the value of the parameter, resolving it on first access.
    ///
    /// # Panics
    /// Panics if the declared default value cannot be parsed as a `T`.
    /// An unparseable environment value only produces a warning on stderr.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.get_ref()
    }

    /// Like [`EnvParam::get`] but without requiring `T: Copy`.
    pub fn get_ref(&self) -> &T {
        self.value.get_or_init(|| match std::env::var(self.env) {
            Ok(raw) => match T::from_str(&raw) {
                Ok(value) => value,
                Err(_) => {
                    eprintln!(
                        "[env_param] WARNING {}: could not parse \"{raw}\", using default \"{}\"",
                        self.env, self.default
                    );
                    self.parsed_default()
                }
            },
            Err(_) => self.parsed_default(),
        })
    }

    /// Forces the parameter to `value`.
    ///
    /// # Panics
    /// Panics if the parameter was already resolved (by a previous `get` or `set`).
    pub fn set(&self, value: T)
    where
        T: std::fmt::Debug,
    {
        if self.value.set(value).is_err() {
            panic!("[env_param] {}: already initialized", self.env);
        }
    }
}
