// Custom test assertions for integration tests

use std::time::{Duration, Instant};

/// Assertion result for detailed error messages
#[derive(Debug)]
pub struct AssertionResult {
    pub passed: bool,
    pub message: String,
}

impl AssertionResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    pub fn check(condition: bool, message: impl Into<String>) -> Self {
        if condition {
            Self::pass()
        } else {
            Self::fail(message)
        }
    }

    pub fn assert(self) {
        if !self.passed {
            panic!("{}", self.message);
        }
    }
}

/// Retry an assertion until it passes or times out
pub async fn assert_eventually<F, Fut>(
    f: F,
    timeout: Duration,
    interval: Duration,
) -> AssertionResult
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = AssertionResult>,
{
    let start = Instant::now();
    let mut last_result = AssertionResult::fail("No attempts made");

    while start.elapsed() < timeout {
        last_result = f().await;
        if last_result.passed {
            return last_result;
        }
        tokio::time::sleep(interval).await;
    }

    AssertionResult::fail(format!(
        "Assertion did not pass within {:?}: {}",
        timeout, last_result.message
    ))
}
