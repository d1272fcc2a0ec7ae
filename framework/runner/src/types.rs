/// Recommended error type for your load test `main` function and any engine glue code that you
/// write. Configuration failures from [crate::config::RunConfig] convert into it with `?`.
pub type StampedeResult<T> = anyhow::Result<T>;
