//! 계좌 엔티티.
//!
//! 이 모듈은 현금/증거금 잔고와 거래 성과 집계를 포함하는
//! `Account` 엔티티를 정의합니다.

use crate::types::Percentage;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 모의 브로커리지 계좌.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// 계좌 ID
    pub id: String,
    /// 표시 이름
    pub name: String,
    /// 사용 가능한 현금 잔고
    pub cash_balance: Decimal,
    /// 사용 가능한 증거금 잔고
    pub margin_balance: Decimal,
    /// 오픈 주문/포지션에 예약 중인 증거금
    pub outstanding_margin_balance: Decimal,
    /// 증거금 배율 (2 = 2배 레버리지)
    pub margin_percentage: Percentage,
    /// 당일 실현 손익 누계
    pub daily_profit: Decimal,
    /// 최대 단일 수익
    pub biggest_gain: Decimal,
    /// 최대 단일 손실
    pub biggest_loss: Decimal,
    /// 승리 횟수
    pub wins: u32,
    /// 패배 횟수
    pub losses: u32,
    /// 생성 타임스탬프
    pub created_at: DateTime<Utc>,
    /// 마지막 업데이트 타임스탬프
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// 새 계좌를 생성합니다.
    pub fn new(
        id: impl Into<String>,
        cash_balance: Decimal,
        margin_balance: Decimal,
        margin_percentage: Percentage,
    ) -> Self {
        let now = Utc::now();
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            cash_balance,
            margin_balance,
            outstanding_margin_balance: Decimal::ZERO,
            margin_percentage,
            daily_profit: Decimal::ZERO,
            biggest_gain: Decimal::ZERO,
            biggest_loss: Decimal::ZERO,
            wins: 0,
            losses: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 표시 이름을 설정합니다.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 매수 여력 (현금 + 증거금)을 반환합니다.
    pub fn buying_power(&self) -> Decimal {
        self.cash_balance + self.margin_balance
    }

    /// 실현 손익을 성과 집계에 반영합니다.
    ///
    /// `breakeven_band` 이내의 손익은 승/패 어느 쪽으로도 집계하지 않습니다.
    pub fn record_trade_result(&mut self, profit: Decimal, breakeven_band: Decimal) {
        self.daily_profit += profit;

        if profit > self.biggest_gain {
            self.biggest_gain = profit;
        }
        if profit < self.biggest_loss {
            self.biggest_loss = profit;
        }

        if profit > breakeven_band {
            self.wins += 1;
        } else if profit < -breakeven_band {
            self.losses += 1;
        }

        self.updated_at = Utc::now();
    }
}
