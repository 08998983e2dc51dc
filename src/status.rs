/// file: src/status.rs
/// description: Auction lifecycle status and its inference from free-text system messages
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    BeforeStart,
    #[default]
    Bidding,
    EndingSoon,
    Ended,
    Successful,
    Failed,
}

impl AuctionStatus {
    /// Maps a structured status code from the server. Unknown codes yield `None`
    /// so callers can fall back to keyword inference.
    pub fn from_code(code: &str) -> Option<Self> {
        let status = match code.trim().to_ascii_uppercase().as_str() {
            "BEFORE_START" | "PENDING" | "SCHEDULED" => AuctionStatus::BeforeStart,
            "BIDDING" | "ACTIVE" | "IN_PROGRESS" => AuctionStatus::Bidding,
            "ENDING_SOON" => AuctionStatus::EndingSoon,
            "ENDED" | "CLOSED" => AuctionStatus::Ended,
            "SUCCESSFUL" | "SOLD" | "SUCCESS" => AuctionStatus::Successful,
            "FAILED" | "UNSOLD" | "FAIL" => AuctionStatus::Failed,
            _ => return None,
        };
        Some(status)
    }

    /// Keyword inference over human-readable content.
    ///
    /// Precedence is significant and mirrors what the server copy relies on:
    /// "시작" beats "종료 임박"/"10분 후", which beat a bare "종료", which beats
    /// "낙찰"/"성공", which beat "유찰"/"실패". `None` means "leave unchanged".
    pub fn infer_from_content(content: &str) -> Option<Self> {
        if content.contains("시작") {
            Some(AuctionStatus::BeforeStart)
        } else if content.contains("종료 임박") || content.contains("10분 후") {
            Some(AuctionStatus::EndingSoon)
        } else if content.contains("종료") && !content.contains("임박") {
            Some(AuctionStatus::Ended)
        } else if content.contains("낙찰") || content.contains("성공") {
            Some(AuctionStatus::Successful)
        } else if content.contains("유찰") || content.contains("실패") {
            Some(AuctionStatus::Failed)
        } else {
            None
        }
    }

    /// Structured code first, keyword inference second, otherwise `current`.
    pub fn resolve(code: Option<&str>, content: &str, current: AuctionStatus) -> AuctionStatus {
        code.and_then(AuctionStatus::from_code)
            .or_else(|| AuctionStatus::infer_from_content(content))
            .unwrap_or(current)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Successful | AuctionStatus::Failed)
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Ended | AuctionStatus::Successful | AuctionStatus::Failed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuctionStatus::BeforeStart => "경매 시작 전",
            AuctionStatus::Bidding => "입찰 중",
            AuctionStatus::EndingSoon => "종료 임박",
            AuctionStatus::Ended => "경매 종료",
            AuctionStatus::Successful => "낙찰",
            AuctionStatus::Failed => "유찰",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuctionStatus::BeforeStart => "BEFORE_START",
            AuctionStatus::Bidding => "BIDDING",
            AuctionStatus::EndingSoon => "ENDING_SOON",
            AuctionStatus::Ended => "ENDED",
            AuctionStatus::Successful => "SUCCESSFUL",
            AuctionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_examples() {
        assert_eq!(
            AuctionStatus::infer_from_content("경매가 10분 후 종료됩니다"),
            Some(AuctionStatus::EndingSoon)
        );
        assert_eq!(
            AuctionStatus::infer_from_content("낙찰되었습니다"),
            Some(AuctionStatus::Successful)
        );
        assert_eq!(
            AuctionStatus::infer_from_content("경매가 종료되었습니다"),
            Some(AuctionStatus::Ended)
        );
    }

    #[test]
    fn test_inference_precedence() {
        assert_eq!(
            AuctionStatus::infer_from_content("경매가 곧 시작됩니다"),
            Some(AuctionStatus::BeforeStart)
        );
        assert_eq!(
            AuctionStatus::infer_from_content("경매 종료 임박!"),
            Some(AuctionStatus::EndingSoon)
        );
        // a bare "종료" outranks "낙찰"
        assert_eq!(
            AuctionStatus::infer_from_content("경매가 종료되어 낙찰되었습니다"),
            Some(AuctionStatus::Ended)
        );
        assert_eq!(
            AuctionStatus::infer_from_content("입찰자가 없어 유찰되었습니다"),
            Some(AuctionStatus::Failed)
        );
        assert_eq!(
            AuctionStatus::infer_from_content("결제에 실패했습니다"),
            Some(AuctionStatus::Failed)
        );
        assert_eq!(AuctionStatus::infer_from_content("새 입찰이 등록되었습니다"), None);
    }

    #[test]
    fn test_resolve_prefers_structured_code() {
        let status = AuctionStatus::resolve(Some("FAILED"), "낙찰되었습니다", AuctionStatus::Bidding);
        assert_eq!(status, AuctionStatus::Failed);

        let status = AuctionStatus::resolve(Some("WHATEVER"), "낙찰되었습니다", AuctionStatus::Bidding);
        assert_eq!(status, AuctionStatus::Successful);

        let status = AuctionStatus::resolve(None, "안내 메시지", AuctionStatus::EndingSoon);
        assert_eq!(status, AuctionStatus::EndingSoon);
    }

    #[test]
    fn test_terminal_states() {
        assert!(AuctionStatus::Successful.is_terminal());
        assert!(AuctionStatus::Failed.is_terminal());
        assert!(!AuctionStatus::Ended.is_terminal());
        assert!(AuctionStatus::Ended.is_closed());
    }

    #[test]
    fn test_serde_codes() {
        let json = serde_json::to_string(&AuctionStatus::EndingSoon).unwrap();
        assert_eq!(json, "\"ENDING_SOON\"");
        assert_eq!(AuctionStatus::from_code("ending_soon"), Some(AuctionStatus::EndingSoon));
    }
}
