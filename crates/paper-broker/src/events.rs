//! 브로커 이벤트 브로드캐스트.
//!
//! 주문/포지션 변경을 구독자에게 알리는 단방향 알림 채널이다.
//! 이벤트는 정보 제공용이며 장부 정합성은 이벤트 전달에 의존하지 않는다.

use paper_core::{Order, Position};
use serde::Serialize;
use tokio::sync::broadcast;

/// 이벤트 채널 기본 용량.
const DEFAULT_CAPACITY: usize = 256;

/// 브로커 이벤트.
///
/// 각 이벤트는 변경이 반영된 엔티티 전체를 담는다.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// 주문 생성됨
    OrderCreated(Order),
    /// 주문 전량 체결됨
    OrderFilled(Order),
    /// 주문 취소됨
    OrderCanceled(Order),
    /// 주문 정정됨
    OrderReplaced {
        /// 대체된 이전 주문
        old: Box<Order>,
        /// 새로 생성된 주문
        new: Box<Order>,
    },
    /// 포지션 오픈됨
    PositionOpened(Position),
    /// 포지션 전량 청산됨
    PositionClosed(Position),
}

/// 브로커 이벤트 버스.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BrokerEvent>,
}

impl EventBus {
    /// 지정된 용량의 이벤트 버스를 생성한다.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 이벤트 수신자를 반환한다.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.sender.subscribe()
    }

    /// 이벤트를 발행한다. 구독자가 없으면 조용히 버려진다.
    pub fn publish(&self, event: BrokerEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_core::{OrderIntent, OrderRequest, Side, Symbol};
    use rust_decimal_macros::dec;

    #[test]
    fn test_publish_and_receive() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();

        let order = paper_core::Order::from_request(OrderRequest::market(
            Symbol::from("AAPL"),
            "default",
            Side::Buy,
            OrderIntent::Open,
            dec!(10),
        ));
        bus.publish(BrokerEvent::OrderCreated(order.clone()));

        match receiver.try_recv() {
            Ok(BrokerEvent::OrderCreated(received)) => assert_eq!(received.id, order.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        // 구독자가 없어도 발행은 실패하지 않는다
        let order = paper_core::Order::from_request(OrderRequest::market(
            Symbol::from("MSFT"),
            "default",
            Side::Sell,
            OrderIntent::Close,
            dec!(1),
        ));
        bus.publish(BrokerEvent::OrderFilled(order));
    }
}
