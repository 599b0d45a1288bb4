//! 주문 타입 및 생명주기.
//!
//! 이 모듈은 브로커 시스템의 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderIntent` - 주문 의도 (진입/청산)
//! - `OrderType` - 주문 유형 (시장가, 지정가 등)
//! - `OrderStatusType` - 주문 상태
//! - `TimeInForce` - 주문 유효 기간
//! - `Fill` - 개별 체결 기록
//! - `OrderRequest` - 주문 요청
//! - `Order` - 주문 엔티티

use crate::types::{mean, Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 의도.
///
/// 진입 주문은 체결 시 포지션을 열고, 청산 주문은 기존 포지션을 줄입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderIntent {
    /// 포지션 진입
    Open,
    /// 포지션 청산
    Close,
}

impl std::fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderIntent::Open => write!(f, "OPEN"),
            OrderIntent::Close => write!(f, "CLOSE"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// 시장가 주문 - 현재 시장 가격으로 즉시 체결
    Market,
    /// 지정가 주문 - 지정 가격 이상/이하에서 체결
    Limit,
    /// 스톱 주문
    Stop,
    /// 지정가 스톱 주문
    StopLimit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// 주문 상태 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// 주문 생성됨 (아직 활성화되지 않음)
    Pending,
    /// 부모 주문 체결을 대기 중 (익절 자식 주문)
    PendingActivation,
    /// 취소 처리 대기 중
    PendingCancel,
    /// 정정 처리 대기 중
    PendingReplace,
    /// 접수됨
    Accepted,
    /// 체결 대상으로 활성화됨
    Working,
    /// 전량 체결됨
    Filled,
    /// 취소됨
    Canceled,
    /// 거부됨
    Rejected,
    /// 유효 기간 만료
    Expired,
    /// 정정으로 대체됨
    Replaced,
}

impl OrderStatusType {
    /// 주문이 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Filled
                | OrderStatusType::Canceled
                | OrderStatusType::Rejected
                | OrderStatusType::Expired
                | OrderStatusType::Replaced
        )
    }

    /// 주문이 아직 체결 가능성이 있는 상태인지 확인합니다.
    pub fn is_unfulfilled(&self) -> bool {
        !self.is_final()
    }

    /// 주문이 정정 가능한 상태인지 확인합니다.
    pub fn is_replaceable(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Pending | OrderStatusType::Accepted | OrderStatusType::Working
        )
    }
}

impl std::fmt::Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Pending => "PENDING",
            OrderStatusType::PendingActivation => "PENDING_ACTIVATION",
            OrderStatusType::PendingCancel => "PENDING_CANCEL",
            OrderStatusType::PendingReplace => "PENDING_REPLACE",
            OrderStatusType::Accepted => "ACCEPTED",
            OrderStatusType::Working => "WORKING",
            OrderStatusType::Filled => "FILLED",
            OrderStatusType::Canceled => "CANCELED",
            OrderStatusType::Rejected => "REJECTED",
            OrderStatusType::Expired => "EXPIRED",
            OrderStatusType::Replaced => "REPLACED",
        };
        write!(f, "{}", s)
    }
}

/// 주문 유효 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// 당일 유효
    Day,
    /// 취소될 때까지 유효 (Good Till Cancelled)
    GTC,
    /// 즉시 체결 또는 취소 (Immediate Or Cancel)
    IOC,
    /// 전량 체결 또는 취소 (Fill Or Kill)
    FOK,
}

/// 개별 체결 기록.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// 체결 수량
    pub quantity: Quantity,
    /// 체결 가격
    pub price: Price,
    /// 체결 시각
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// 새 체결 기록을 생성합니다.
    pub fn new(quantity: Quantity, price: Price) -> Self {
        Self {
            quantity,
            price,
            timestamp: Utc::now(),
        }
    }
}

/// 새 주문 생성을 위한 주문 요청.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 주문을 낸 계좌 ID
    pub account_id: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 의도
    pub intent: OrderIntent,
    /// 주문 유형
    pub order_type: OrderType,
    /// 거래 수량
    pub quantity: Quantity,
    /// 지정가 (지정가 주문에 필수)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Price>,
    /// 스톱 가격 (스톱 주문용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    /// 주문 유효 기간
    pub time_in_force: TimeInForce,
    /// 체결 시 함께 활성화할 익절 지정가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Price>,
    /// 이 주문을 생성한 전략 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<Uuid>,
    /// 전략 이름
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_name: Option<String>,
    /// 주문 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OrderRequest {
    /// 시장가 주문 요청을 생성합니다.
    pub fn market(
        symbol: Symbol,
        account_id: impl Into<String>,
        side: Side,
        intent: OrderIntent,
        quantity: Quantity,
    ) -> Self {
        Self {
            symbol,
            account_id: account_id.into(),
            side,
            intent,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::GTC,
            take_profit: None,
            strategy_id: None,
            strategy_name: None,
            reason: None,
        }
    }

    /// 지정가 주문 요청을 생성합니다.
    pub fn limit(
        symbol: Symbol,
        account_id: impl Into<String>,
        side: Side,
        intent: OrderIntent,
        quantity: Quantity,
        price: Price,
    ) -> Self {
        Self {
            symbol,
            account_id: account_id.into(),
            side,
            intent,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::GTC,
            take_profit: None,
            strategy_id: None,
            strategy_name: None,
            reason: None,
        }
    }

    /// 익절 지정가를 설정합니다.
    pub fn with_take_profit(mut self, price: Price) -> Self {
        self.take_profit = Some(price);
        self
    }

    /// 스톱 주문 요청을 생성합니다. 스톱 가격 도달 시 시장가로 체결됩니다.
    pub fn stop(
        symbol: Symbol,
        account_id: impl Into<String>,
        side: Side,
        intent: OrderIntent,
        quantity: Quantity,
        stop_price: Price,
    ) -> Self {
        Self {
            symbol,
            account_id: account_id.into(),
            side,
            intent,
            order_type: OrderType::Stop,
            quantity,
            limit_price: None,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::GTC,
            take_profit: None,
            strategy_id: None,
            strategy_name: None,
            reason: None,
        }
    }

    /// 스톱 가격을 설정하고 주문 유형을 스톱 계열로 승격합니다.
    pub fn with_stop_price(mut self, price: Price) -> Self {
        self.stop_price = Some(price);
        self.order_type = match self.order_type {
            OrderType::Limit | OrderType::StopLimit => OrderType::StopLimit,
            OrderType::Market | OrderType::Stop => OrderType::Stop,
        };
        self
    }

    /// 전략 정보를 설정합니다.
    pub fn with_strategy(mut self, strategy_id: Uuid, strategy_name: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id);
        self.strategy_name = Some(strategy_name.into());
        self
    }

    /// 주문 사유를 설정합니다.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// 주문 유효 기간을 설정합니다.
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

/// 장부에 기록된 주문 엔티티.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 내부 주문 ID
    pub id: Uuid,
    /// 거래 심볼
    pub symbol: Symbol,
    /// 주문을 낸 계좌 ID
    pub account_id: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 의도
    pub intent: OrderIntent,
    /// 주문 유형
    pub order_type: OrderType,
    /// 원래 수량
    pub quantity: Quantity,
    /// 체결된 수량
    pub filled_quantity: Quantity,
    /// 지정가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Price>,
    /// 스톱 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    /// 평균 체결 가격 (개별 체결 가격의 산술 평균)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_average_price: Option<Price>,
    /// 현재 상태
    pub status: OrderStatusType,
    /// 주문 유효 기간
    pub time_in_force: TimeInForce,
    /// 주문에 예약된 현금
    pub reserved_cash: Decimal,
    /// 주문에 예약된 증거금
    pub reserved_margin: Decimal,
    /// 최근 가격 기준 명목 가치
    pub market_value: Decimal,
    /// 개별 체결 이력
    #[serde(default)]
    pub fills: Vec<Fill>,
    /// 부모 체결 시 활성화되는 자식 주문 (익절)
    #[serde(default)]
    pub child_orders: Vec<Order>,
    /// 부모 주문 ID (자식 주문인 경우)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// 이 주문을 생성한 전략 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<Uuid>,
    /// 전략 이름
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_name: Option<String>,
    /// 주문 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 생성 타임스탬프
    pub created_at: DateTime<Utc>,
    /// 마지막 업데이트 타임스탬프
    pub updated_at: DateTime<Utc>,
    /// 전량 체결 타임스탬프
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
    /// 취소 타임스탬프
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// 요청으로부터 새 주문을 생성합니다.
    pub fn from_request(request: OrderRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            symbol: request.symbol,
            account_id: request.account_id,
            side: request.side,
            intent: request.intent,
            order_type: request.order_type,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            filled_average_price: None,
            status: OrderStatusType::Pending,
            time_in_force: request.time_in_force,
            reserved_cash: Decimal::ZERO,
            reserved_margin: Decimal::ZERO,
            market_value: Decimal::ZERO,
            fills: Vec::new(),
            child_orders: Vec::new(),
            parent_id: None,
            strategy_id: request.strategy_id,
            strategy_name: request.strategy_name,
            reason: request.reason,
            created_at: now,
            updated_at: now,
            filled_at: None,
            canceled_at: None,
        }
    }

    /// 남은 체결 수량을 반환합니다.
    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    /// 주문이 전량 체결되었는지 확인합니다.
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatusType::Filled
    }

    /// 주문이 아직 체결 가능성이 있는지 확인합니다.
    pub fn is_unfulfilled(&self) -> bool {
        self.status.is_unfulfilled()
    }

    /// 주문이 정정 가능한 상태인지 확인합니다.
    pub fn is_replaceable(&self) -> bool {
        self.status.is_replaceable()
    }

    /// 체결을 기록하고 전량 체결 여부를 반환합니다.
    ///
    /// 체결 수량은 남은 수량을 초과하지 않도록 잘립니다. 전량 체결 시
    /// 상태가 `Filled`로 전이되고 평균 체결 가격이 확정됩니다.
    pub fn record_fill(&mut self, fill: Fill) -> bool {
        let quantity = fill.quantity.min(self.remaining_quantity());
        if quantity <= Decimal::ZERO {
            return self.is_filled();
        }

        self.fills.push(Fill { quantity, ..fill });
        self.filled_quantity += quantity;
        let prices: Vec<Decimal> = self.fills.iter().map(|f| f.price).collect();
        self.filled_average_price = Some(mean(&prices));
        self.updated_at = Utc::now();

        if self.filled_quantity >= self.quantity {
            self.status = OrderStatusType::Filled;
            self.filled_at = Some(self.updated_at);
            true
        } else {
            false
        }
    }

    /// 최근 가격으로 명목 가치를 갱신합니다.
    pub fn refresh_market_value(&mut self, price: Price) {
        self.market_value = price * self.quantity;
        self.updated_at = Utc::now();
    }

    /// 주문을 체결 대상으로 활성화합니다.
    pub fn mark_working(&mut self) {
        self.status = OrderStatusType::Working;
        self.updated_at = Utc::now();
    }
}
