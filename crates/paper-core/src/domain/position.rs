//! 포지션 엔티티 및 손익 계산.
//!
//! 이 모듈은 포지션 관련 타입을 정의합니다:
//! - `PositionType` - 포지션 방향 (롱/숏)
//! - `PositionStatus` - 포지션 상태
//! - `Position` - 개별 포지션 엔티티

use crate::domain::Side;
use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    /// 롱 포지션 (매수 진입)
    Long,
    /// 숏 포지션 (매도 진입)
    Short,
}

impl PositionType {
    /// 진입 주문의 방향으로부터 포지션 방향을 결정합니다.
    pub fn from_entry_side(side: Side) -> Self {
        match side {
            Side::Buy => PositionType::Long,
            Side::Sell => PositionType::Short,
        }
    }

    /// 이 포지션을 청산하는 주문의 방향을 반환합니다.
    pub fn closing_side(&self) -> Side {
        match self {
            PositionType::Long => Side::Sell,
            PositionType::Short => Side::Buy,
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionType::Long => write!(f, "LONG"),
            PositionType::Short => write!(f, "SHORT"),
        }
    }
}

/// 포지션 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    /// 오픈 상태
    Open,
    /// 전량 청산됨
    Closed,
}

/// 한 종목의 보유량을 나타내는 포지션.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 내부 포지션 ID
    pub id: Uuid,
    /// 거래 심볼
    pub symbol: Symbol,
    /// 보유 계좌 ID
    pub account_id: String,
    /// 포지션 방향
    pub position_type: PositionType,
    /// 포지션 상태
    pub status: PositionStatus,
    /// 남은 보유 수량
    pub quantity: Quantity,
    /// 지금까지 청산된 수량
    pub closed_quantity: Quantity,
    /// 평균 진입 가격
    pub average_entry_price: Price,
    /// 진입 시 지불한 총 금액
    pub purchased_value: Decimal,
    /// 청산으로 회수한 누적 금액
    pub closed_value: Decimal,
    /// 마지막 청산 체결의 평균 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_average_price: Option<Price>,
    /// 최근 가격 기준 명목 가치
    pub market_value: Decimal,
    /// 미실현 손익
    pub unrealized_profit: Decimal,
    /// 실현 손익 (전량 청산 시 확정)
    pub realized_profit: Decimal,
    /// 진입 주문에서 승계한 현금 예약
    pub reserved_cash: Decimal,
    /// 진입 주문에서 승계한 증거금 예약
    pub reserved_margin: Decimal,
    /// 익절 목표 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Price>,
    /// 손절 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Price>,
    /// 청산 진행 중 잠금 (중복 청산 주문 방지)
    pub liquidate_lock: bool,
    /// 이 포지션과 연관된 주문 ID 목록
    #[serde(default)]
    pub order_ids: Vec<Uuid>,
    /// 이 포지션을 연 전략 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<Uuid>,
    /// 생성 타임스탬프
    pub created_at: DateTime<Utc>,
    /// 마지막 업데이트 타임스탬프
    pub updated_at: DateTime<Utc>,
    /// 청산 타임스탬프
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// 보유 기간 (초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl Position {
    /// 새 포지션을 생성합니다.
    pub fn new(
        symbol: Symbol,
        account_id: impl Into<String>,
        position_type: PositionType,
        quantity: Quantity,
        entry_price: Price,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            symbol,
            account_id: account_id.into(),
            position_type,
            status: PositionStatus::Open,
            quantity,
            closed_quantity: Decimal::ZERO,
            average_entry_price: entry_price,
            purchased_value: entry_price * quantity,
            closed_value: Decimal::ZERO,
            closed_average_price: None,
            market_value: entry_price * quantity,
            unrealized_profit: Decimal::ZERO,
            realized_profit: Decimal::ZERO,
            reserved_cash: Decimal::ZERO,
            reserved_margin: Decimal::ZERO,
            take_profit: None,
            stop_loss: None,
            liquidate_lock: false,
            order_ids: Vec::new(),
            strategy_id: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            duration_seconds: None,
        }
    }

    /// 포지션이 오픈 상태인지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// 포지션이 전량 청산되었는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// 현재 가격으로 명목 가치와 미실현 손익을 갱신합니다.
    pub fn update_price(&mut self, price: Price) {
        self.market_value = price * self.quantity;
        let diff = match self.position_type {
            PositionType::Long => price - self.average_entry_price,
            PositionType::Short => self.average_entry_price - price,
        };
        self.unrealized_profit = diff * self.quantity;
        self.updated_at = Utc::now();
    }

    /// 같은 방향의 추가 진입 체결을 포지션에 누적합니다.
    ///
    /// 평균 진입 가격은 지금까지 취득한 전체 수량(남은 보유분 + 이미
    /// 청산된 분) 기준으로 다시 계산됩니다.
    pub fn increase(&mut self, quantity: Quantity, price: Price) {
        if quantity <= Decimal::ZERO {
            return;
        }
        self.quantity += quantity;
        self.purchased_value += price * quantity;

        let acquired = self.quantity + self.closed_quantity;
        if !acquired.is_zero() {
            self.average_entry_price = self.purchased_value / acquired;
        }
        self.update_price(price);
    }

    /// 청산 체결을 반영하고 실제로 줄어든 수량을 반환합니다.
    ///
    /// 청산 수량은 남은 보유 수량을 초과하지 않도록 잘립니다. 보유 수량이
    /// 0이 되면 실현 손익을 확정하고 포지션을 종료합니다.
    pub fn reduce(&mut self, quantity: Quantity, price: Price) -> Quantity {
        let reduce_qty = quantity.min(self.quantity);
        if reduce_qty <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        self.quantity -= reduce_qty;
        self.closed_quantity += reduce_qty;
        self.closed_value += price * reduce_qty;
        self.closed_average_price = Some(price);
        self.updated_at = Utc::now();

        if self.quantity.is_zero() {
            self.realized_profit = match self.position_type {
                PositionType::Long => self.closed_value - self.purchased_value,
                PositionType::Short => self.purchased_value - self.closed_value,
            };
            self.status = PositionStatus::Closed;
            let closed_at = Utc::now();
            self.duration_seconds = Some((closed_at - self.created_at).num_seconds());
            self.closed_at = Some(closed_at);
            self.unrealized_profit = Decimal::ZERO;
            self.market_value = Decimal::ZERO;
        } else {
            self.update_price(price);
        }

        reduce_qty
    }
}
