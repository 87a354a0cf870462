use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "tern_core=debug,reqwest=info,info";
const LOG_ENV_VAR: &str = "TERN_LOG";
#[cfg_attr(not(target_os = "ios"), allow(dead_code))]
const LOG_FILE_NAME: &str = "tern.log";

/// Directives from `TERN_LOG` (then `RUST_LOG`) when set and non-empty.
fn filter_directives(from_env: Option<String>) -> String {
    from_env
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn build_filter(directives: &str) -> EnvFilter {
    // Malformed overrides fall back to the default.
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn env_filter() -> EnvFilter {
    let from_env = std::env::var(LOG_ENV_VAR)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok();
    build_filter(&filter_directives(from_env))
}

/// Platform-native logging initialization.
///
/// - iOS: tracing-oslog → os_log under the `sync` category, plus `<data_dir>/tern.log`
/// - Android: paranoid-android → logcat tag `tern`
/// - Tests / desktop: tracing-subscriber::fmt → stderr
///
/// Every platform honors `TERN_LOG`. Message text is never logged; see `AppAction::tag`.
/// Called once at the start of `FfiApp::new()`; later calls are no-ops.
pub fn init_logging(#[allow(unused)] data_dir: &str) {
    #[cfg(target_os = "ios")]
    {
        use tracing_subscriber::prelude::*;

        let os_log = tracing_oslog::OsLogger::new("com.tern.app", "sync");

        let _ = std::fs::create_dir_all(data_dir);
        let log_path = std::path::Path::new(data_dir).join(LOG_FILE_NAME);
        let file_layer = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok()
            .map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
            });

        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(os_log)
            .with(file_layer)
            .try_init();
    }

    #[cfg(target_os = "android")]
    {
        use tracing_subscriber::prelude::*;

        let _ = tracing_subscriber::registry()
            .with(paranoid_android::layer("tern").with_filter(env_filter()))
            .try_init();
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_env_uses_default() {
        assert_eq!(filter_directives(None), DEFAULT_FILTER);
        assert_eq!(filter_directives(Some("   ".into())), DEFAULT_FILTER);
    }

    #[test]
    fn env_directives_are_trimmed() {
        assert_eq!(
            filter_directives(Some(" tern_core=trace ".into())),
            "tern_core=trace"
        );
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        let _ = build_filter("tern_core=trace,warn");
    }
}
