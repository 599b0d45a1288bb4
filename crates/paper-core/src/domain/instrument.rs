//! 종목 스냅샷 및 가격 제공자 trait.
//!
//! 이 모듈은 체결 판정에 필요한 종목별 시장 상태를 정의합니다:
//! - `Instrument` - 최근 봉 2개와 평균 거래량을 담은 스냅샷
//! - `InstrumentProvider` - 종목 스냅샷 조회 trait

use crate::domain::PriceMovement;
use crate::types::{Price, Quantity, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 한 종목의 시장 상태 스냅샷.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 가장 최근 봉
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bar: Option<PriceMovement>,
    /// 직전 봉
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_bar: Option<PriceMovement>,
    /// 최근 봉들의 평균 거래량
    pub average_volume: Quantity,
}

impl Instrument {
    /// 봉 이력이 없는 새 종목 스냅샷을 생성합니다.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            last_bar: None,
            previous_bar: None,
            average_volume: Decimal::ZERO,
        }
    }

    /// 가장 최근 종가를 반환합니다.
    pub fn latest_price(&self) -> Option<Price> {
        self.last_bar.as_ref().map(|bar| bar.close)
    }

    /// 가격 정보가 있는지 확인합니다.
    pub fn has_pricing(&self) -> bool {
        self.last_bar.is_some()
    }
}

/// 종목 스냅샷 조회 trait.
///
/// 주문 장부와 체결 시뮬레이터가 가격 정보를 조회할 때 사용합니다.
pub trait InstrumentProvider: Send + Sync {
    /// 종목 스냅샷을 반환합니다.
    fn instrument(&self, symbol: &Symbol) -> Option<Instrument>;

    /// 가장 최근 종가를 반환합니다.
    fn latest_price(&self, symbol: &Symbol) -> Option<Price> {
        self.instrument(symbol).and_then(|i| i.latest_price())
    }
}
