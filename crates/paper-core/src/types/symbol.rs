//! 종목 심볼 정의.
//!
//! 이 모듈은 거래 가능한 종목을 나타내는 `Symbol` 타입을 정의합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 거래 가능한 종목을 나타내는 티커 심볼.
///
/// 심볼은 대문자로 정규화된 티커 문자열입니다. 예: AAPL, MSFT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(ticker.into().trim().to_uppercase())
    }

    /// 티커 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
