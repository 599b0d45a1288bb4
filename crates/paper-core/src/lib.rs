//! # Paper Core
//!
//! 모의 브로커리지의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 브로커 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 주문 및 주문 생명주기 타입
//! - 포지션 및 계좌 엔티티
//! - 가격 이동 및 종목 스냅샷 구조체
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
