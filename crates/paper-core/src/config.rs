//! 설정 관리.
//!
//! 이 모듈은 브로커 설정을 정의하고 관리합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 브로커 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// 시드 계좌 설정
    #[serde(default)]
    pub account: AccountConfig,
    /// 주문 설정
    #[serde(default)]
    pub orders: OrderConfig,
    /// 장부 설정
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// 체결 시뮬레이션 설정
    #[serde(default)]
    pub fills: FillConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 시드 계좌 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    /// 계좌 ID
    pub id: String,
    /// 초기 현금 잔고
    pub cash_balance: Decimal,
    /// 초기 증거금 잔고
    pub margin_balance: Decimal,
    /// 증거금 배율 (2 = 2배 레버리지)
    pub margin_percentage: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            cash_balance: Decimal::from(40_000),
            margin_balance: Decimal::from(80_000),
            margin_percentage: Decimal::from(2),
        }
    }
}

/// 주문 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderConfig {
    /// 랏 분할 임계값. 이 수량을 초과하는 주문은 균등한 랏으로 분할됩니다.
    pub lot_size: Decimal,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            lot_size: Decimal::from(100),
        }
    }
}

/// 장부 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// 증거금 예약 시 남겨두는 안전 버퍼
    pub margin_safety_buffer: Decimal,
    /// 승/패 집계에서 무승부로 취급하는 손익 구간 (± 값)
    pub breakeven_band: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            margin_safety_buffer: Decimal::from(30),
            breakeven_band: Decimal::from(5),
        }
    }
}

/// 체결 가격 결정 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// 지정가(없으면 종가)로 결정적으로 체결
    Deterministic,
    /// 봉 범위 내에서 무작위 가격으로 체결
    Randomized,
}

impl Default for FillMode {
    fn default() -> Self {
        Self::Deterministic
    }
}

/// 체결 시뮬레이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FillConfig {
    /// 체결 가격 결정 방식
    pub mode: FillMode,
    /// 무작위 모드에서 정확히 지정가에 체결될 확률 (0.0 ~ 1.0)
    pub exact_limit_probability: f64,
    /// 봉 거래량 대비 허용 주문 수량 배수
    pub liquidity_multiplier: Decimal,
    /// 평균 거래량 계산에 사용하는 봉 개수
    pub average_volume_window: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            mode: FillMode::Deterministic,
            exact_limit_probability: 0.3,
            liquidity_multiplier: Decimal::from(3),
            average_volume_window: 30,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl BrokerConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("PAPER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.account.cash_balance, dec!(40000));
        assert_eq!(config.account.margin_balance, dec!(80000));
        assert_eq!(config.orders.lot_size, dec!(100));
        assert_eq!(config.ledger.margin_safety_buffer, dec!(30));
        assert_eq!(config.ledger.breakeven_band, dec!(5));
        assert_eq!(config.fills.mode, FillMode::Deterministic);
    }

    #[test]
    fn test_fill_mode_deserialize() {
        let mode: FillMode = serde_json::from_str("\"randomized\"").unwrap();
        assert_eq!(mode, FillMode::Randomized);
    }
}
