//! 시장 데이터 타입 및 구조체.
//!
//! 이 모듈은 체결 시뮬레이션에 사용되는 가격 이동(OHLCV 봉) 타입을
//! 정의합니다.

use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 한 종목의 가격 이동 (OHLCV 봉).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMovement {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 봉 시작 시간
    pub start_time: DateTime<Utc>,
    /// 봉 종료 시간
    pub end_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: Quantity,
}

impl PriceMovement {
    /// 새 가격 이동을 생성합니다. 종료 시간은 시작 시간으로 초기화됩니다.
    pub fn new(
        symbol: Symbol,
        start_time: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            symbol,
            start_time,
            end_time: start_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 봉 종료 시간을 설정합니다.
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = end_time;
        self
    }

    /// 봉 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 가격이 봉 범위 안에 있는지 확인합니다.
    pub fn contains(&self, price: Price) -> bool {
        price >= self.low && price <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar() -> PriceMovement {
        PriceMovement::new(
            Symbol::from("AAPL"),
            Utc::now(),
            dec!(100),
            dec!(105),
            dec!(98),
            dec!(103),
            dec!(5000),
        )
    }

    #[test]
    fn test_range() {
        assert_eq!(bar().range(), dec!(7));
    }

    #[test]
    fn test_contains() {
        let movement = bar();
        assert!(movement.contains(dec!(100)));
        assert!(movement.contains(dec!(98)));
        assert!(!movement.contains(dec!(97.99)));
        assert!(!movement.contains(dec!(106)));
    }
}
