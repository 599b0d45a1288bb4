//! 브로커 시스템의 에러 타입.
//!
//! 이 모듈은 브로커 시스템 전반에서 사용되는 에러 타입을 정의합니다.

use crate::types::Symbol;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// 핵심 브로커 에러.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// 가격 정보가 없는 종목
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(Symbol),

    /// 찾을 수 없는 계좌
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// 매수 여력 부족
    #[error("Insufficient buying power: required {required}, available {available}")]
    InsufficientBuyingPower {
        required: Decimal,
        available: Decimal,
    },

    /// 증거금 부족
    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin {
        required: Decimal,
        available: Decimal,
    },

    /// 청산 체결에 대응하는 오픈 포지션 없음
    #[error("No matching open position for closing order {order_id} on {symbol}")]
    NoMatchingPosition { order_id: Uuid, symbol: Symbol },

    /// 동일 종목에 이미 오픈된 포지션 존재
    #[error("Position already open for {symbol} on account {account_id}")]
    PositionAlreadyOpen {
        symbol: Symbol,
        account_id: String,
    },

    /// 정정 불가능한 상태의 주문
    #[error("Order not replaceable: {0}")]
    OrderNotReplaceable(Uuid),

    /// 이미 체결 처리 중인 주문에 대한 중복 체결 시도
    #[error("Duplicate fill rejected for order: {0}")]
    DuplicateFillRejected(Uuid),

    /// 찾을 수 없는 주문
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    /// 찾을 수 없는 포지션
    #[error("Position not found: {0}")]
    PositionNotFound(Uuid),

    /// 정산 시 계좌 현금이 음수로 내려가는 경우
    #[error("Settlement would drive account {account_id} cash negative: {balance}")]
    CashConservation {
        account_id: String,
        balance: Decimal,
    },

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),
}

/// 브로커 작업을 위한 Result 타입.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    /// 자금 부족으로 인한 거부인지 확인합니다.
    pub fn is_funds_rejection(&self) -> bool {
        matches!(
            self,
            BrokerError::InsufficientBuyingPower { .. } | BrokerError::InsufficientMargin { .. }
        )
    }

    /// 장부 불변식 위반 등 치명적인 에러인지 확인합니다.
    pub fn is_critical(&self) -> bool {
        matches!(self, BrokerError::CashConservation { .. })
    }
}

impl From<config::ConfigError> for BrokerError {
    fn from(err: config::ConfigError) -> Self {
        BrokerError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_funds_rejection() {
        let err = BrokerError::InsufficientBuyingPower {
            required: dec!(1000),
            available: dec!(500),
        };
        assert!(err.is_funds_rejection());
        assert!(!err.is_critical());
    }

    #[test]
    fn test_critical() {
        let err = BrokerError::CashConservation {
            account_id: "default".to_string(),
            balance: dec!(-12.5),
        };
        assert!(err.is_critical());
        assert!(!err.is_funds_rejection());
    }
}
