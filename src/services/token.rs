//! 세션 토큰과 환자 코드 발급
//!
//! 둘 다 사람이 외우기 어려운 불투명 문자열입니다. 유일성은 DB의 UNIQUE
//! 제약이 최종적으로 보장하고, 충돌 시 호출 측(`db::sessions`, `db::patients`)이
//! 새 값으로 다시 시도합니다.

use chrono::Utc;
use rand_core::{OsRng, RngCore};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 36의 배수 구간: 이 이상이 나오면 버리고 다시 뽑습니다 (나머지 편향 제거).
const ACCEPT_BELOW: u32 = u32::MAX - u32::MAX % 36;

fn base36_char(rng: &mut impl RngCore) -> char {
    loop {
        let value = rng.next_u32();
        if value < ACCEPT_BELOW {
            return ALPHABET[(value % 36) as usize] as char;
        }
    }
}

/// 대문자 36진수 랜덤 문자열
fn random_base36(len: usize) -> String {
    (0..len).map(|_| base36_char(&mut OsRng)).collect()
}

/// `VR` + 밀리초 타임스탬프 + 랜덤 9자
pub fn issue_token() -> String {
    format!("VR{}{}", Utc::now().timestamp_millis(), random_base36(9))
}

/// `PT` + 랜덤 8자: VR 런타임에 넘기는 환자 식별자
pub fn patient_code() -> String {
    format!("PT{}", random_base36(8))
}
