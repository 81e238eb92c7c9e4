use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use utoipa::{IntoParams, ToSchema};

/// 兑换结果
/// 业务结果都是正常返回值；存储层故障走 `AppError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RedeemOutcome {
    /// Code accepted, no prize
    #[serde(rename = "CODE_SUCCESS")]
    Success,
    /// Code accepted and the counter hit a milestone
    #[serde(rename = "CODE_PRIZE")]
    Prize,
    /// Code was already activated
    #[serde(rename = "CODE_REPEAT")]
    Repeat,
    /// User already holds the maximum number of prizes
    #[serde(rename = "WINS_LIMIT_EXCEEDED")]
    WinsLimitExceeded,
    /// Malformed user or code
    #[serde(rename = "CODE_WRONG")]
    Wrong,
}

impl RedeemOutcome {
    /// Response body sent to lottery clients
    pub fn as_str(&self) -> &'static str {
        match self {
            RedeemOutcome::Success => "CODE_SUCCESS",
            RedeemOutcome::Prize => "CODE_PRIZE",
            RedeemOutcome::Repeat => "CODE_REPEAT",
            RedeemOutcome::WinsLimitExceeded => "WINS_LIMIT_EXCEEDED",
            RedeemOutcome::Wrong => "CODE_WRONG",
        }
    }

    /// The code was activated by this redemption.
    pub fn is_accepted(&self) -> bool {
        matches!(self, RedeemOutcome::Success | RedeemOutcome::Prize)
    }
}

impl fmt::Display for RedeemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 兑换请求参数（query string）
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RedeemQuery {
    /// 用户名，5 位字母数字
    pub user: String,
    /// 兑换码，5 位字母数字
    pub code: String,
}

impl RedeemQuery {
    /// Accept exactly the `user` and `code` keys; any missing or extra key
    /// makes the request malformed.
    pub fn from_params(mut params: HashMap<String, String>) -> Option<Self> {
        if params.len() != 2 {
            return None;
        }
        Some(Self {
            user: params.remove("user")?,
            code: params.remove("code")?,
        })
    }
}
