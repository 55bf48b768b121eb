use std::{env, str::FromStr};

/// Parse an `envvar` as `T`. Return `fallback` if env missing or parsing fails.
pub fn parse_env_or<T: FromStr>(envvar: &str, fallback: T) -> T {
    env::var(envvar)
        .ok()
        .and_then(|s| T::from_str(&s).ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_or_fallback() {
        assert_eq!(parse_env_or("TRELLIS_TEST_SURELY_UNSET_VAR", 7u32), 7);
    }

    #[test]
    fn test_parse_env_or_bad_value() {
        env::set_var("TRELLIS_TEST_BAD_BOOL", "not-a-bool");
        assert!(parse_env_or("TRELLIS_TEST_BAD_BOOL", true));
        env::set_var("TRELLIS_TEST_BAD_BOOL", "false");
        assert!(!parse_env_or("TRELLIS_TEST_BAD_BOOL", true));
    }
}
