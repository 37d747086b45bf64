#[cfg(feature = "codec")]
pub mod codec;

#[cfg(feature = "logger")]
pub mod logger;

/// 执行一个返回值为 Result 的表达式，如果结果为 Err，打印一条错误日志
/// 用于只记录而不处理错误的情况
#[macro_export]
macro_rules! log_if_err {
    ($run:expr) => {
        $crate::log_if_err!($run, stringify!($run))
    };

    ($run:expr, $msg:expr $(,)?) => {
        if let Err(err) = $run {
            ::tracing::warn!(?err, concat!("FAILED: ", $msg))
        }
    };
}
