//! 모의 브로커리지 장부 및 체결 엔진.
//!
//! 이 crate는 다음을 제공한다:
//! - 현금/증거금 예약과 정산을 담당하는 계좌 장부
//! - 주문 생명주기(생성/정정/취소/체결)를 관리하는 주문 장부
//! - 포지션 오픈/청산 및 손익 계산을 담당하는 포지션 장부
//! - 가격 이동으로부터 체결을 판정하는 체결 시뮬레이터
//!
//! # 예제
//!
//! ```rust,ignore
//! use paper_broker::PaperBroker;
//! use paper_core::BrokerConfig;
//!
//! let broker = PaperBroker::new(BrokerConfig::default());
//!
//! // 주문 생성 후 가격 이동을 공급하면 체결이 시뮬레이션된다
//! broker.on_price_movement(movement);
//! ```

pub mod account_ledger;
pub mod broker;
pub mod events;
pub mod fill_simulator;
pub mod instruments;
pub mod order_book;
pub mod position_book;

// 주요 타입 재내보내기
pub use account_ledger::{AccountLedger, Reservation};
pub use broker::PaperBroker;
pub use events::{BrokerEvent, EventBus};
pub use fill_simulator::FillSimulator;
pub use instruments::InstrumentCatalog;
pub use order_book::OrderBook;
pub use position_book::PositionBook;
