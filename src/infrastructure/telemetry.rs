//! 構造化ログの初期化。
//! tracing-subscriber を使用し、JSON またはテキスト形式で出力する。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// init_logger は tracing-subscriber を初期化する。
///
/// - dev: debug
/// - staging: info
/// - その他: warn
///
/// `RUST_LOG` が設定されている場合はそちらを優先する。
/// format が "text" の場合はプレーンテキスト出力、それ以外は JSON 出力。
pub fn init_logger(env: &str, format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(env)));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "text" {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    }
    Ok(())
}

fn default_level(env: &str) -> &'static str {
    match env {
        "dev" => "debug",
        "staging" => "info",
        _ => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_by_environment() {
        assert_eq!(default_level("dev"), "debug");
        assert_eq!(default_level("staging"), "info");
        assert_eq!(default_level("prod"), "warn");
    }

    #[test]
    fn test_second_init_fails_instead_of_panicking() {
        let _ = init_logger("dev", "text");
        assert!(init_logger("dev", "json").is_err());
    }
}
