use serde::{Deserialize, Serialize};

/// Restricts checkout to a single payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "ef")]
    Eft,
    #[serde(rename = "cc")]
    CreditCard,
    #[serde(rename = "dc")]
    DebitCard,
    #[serde(rename = "mp")]
    MasterpassScanToPay,
    #[serde(rename = "mc")]
    Mobicred,
    #[serde(rename = "sc")]
    SCode,
    #[serde(rename = "ss")]
    SnapScan,
    #[serde(rename = "zp")]
    Zapper,
    #[serde(rename = "mt")]
    MoreTyme,
    #[serde(rename = "rc")]
    StoreCard,
    #[serde(rename = "mu")]
    Mukuru,
    #[serde(rename = "ap")]
    ApplePay,
    #[serde(rename = "sp")]
    SamsungPay,
    #[serde(rename = "cp")]
    CapitecPay,
    #[serde(rename = "gp")]
    GooglePay,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 15] = [
        PaymentMethod::Eft,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::MasterpassScanToPay,
        PaymentMethod::Mobicred,
        PaymentMethod::SCode,
        PaymentMethod::SnapScan,
        PaymentMethod::Zapper,
        PaymentMethod::MoreTyme,
        PaymentMethod::StoreCard,
        PaymentMethod::Mukuru,
        PaymentMethod::ApplePay,
        PaymentMethod::SamsungPay,
        PaymentMethod::CapitecPay,
        PaymentMethod::GooglePay,
    ];

    /// Two-letter code sent as `payment_method`.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentMethod::Eft => "ef",
            PaymentMethod::CreditCard => "cc",
            PaymentMethod::DebitCard => "dc",
            PaymentMethod::MasterpassScanToPay => "mp",
            PaymentMethod::Mobicred => "mc",
            PaymentMethod::SCode => "sc",
            PaymentMethod::SnapScan => "ss",
            PaymentMethod::Zapper => "zp",
            PaymentMethod::MoreTyme => "mt",
            PaymentMethod::StoreCard => "rc",
            PaymentMethod::Mukuru => "mu",
            PaymentMethod::ApplePay => "ap",
            PaymentMethod::SamsungPay => "sp",
            PaymentMethod::CapitecPay => "cp",
            PaymentMethod::GooglePay => "gp",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PaymentMethod::Eft => "Electronic Funds Transfer",
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::DebitCard => "Debit Card",
            PaymentMethod::MasterpassScanToPay => "Masterpass Scan to Pay",
            PaymentMethod::Mobicred => "Mobicred",
            PaymentMethod::SCode => "SCode",
            PaymentMethod::SnapScan => "SnapScan",
            PaymentMethod::Zapper => "Zapper",
            PaymentMethod::MoreTyme => "MoreTyme",
            PaymentMethod::StoreCard => "Store Card",
            PaymentMethod::Mukuru => "Mukuru",
            PaymentMethod::ApplePay => "Apple Pay",
            PaymentMethod::SamsungPay => "Samsung Pay",
            PaymentMethod::CapitecPay => "Capitec Pay",
            PaymentMethod::GooglePay => "Google Pay",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }
}

/// Billing cycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionFrequency {
    Daily = 1,
    Weekly = 2,
    Monthly = 3,
    Quarterly = 4,
    Biannually = 5,
    Annually = 6,
}

impl SubscriptionFrequency {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Daily),
            2 => Some(Self::Weekly),
            3 => Some(Self::Monthly),
            4 => Some(Self::Quarterly),
            5 => Some(Self::Biannually),
            6 => Some(Self::Annually),
            _ => None,
        }
    }
}
