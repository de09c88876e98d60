use crate::domain::error::PaymentErrorKind;
use crate::domain::merchant::Psp;

use PaymentErrorKind::{ConfigurationError, PaymentError, RefundError, TemporaryError};

pub type CodeTable = &'static [(&'static str, PaymentErrorKind)];

const BS_PAYONE: CodeTable = &[
    ("13", PaymentError),
    ("43", PaymentError),
    ("56", PaymentError),
    ("62", PaymentError),
    ("889", PaymentError),
    ("107", PaymentError),
    ("301", PaymentError),
    ("701", PaymentError),
    ("702", PaymentError),
    ("703", PaymentError),
    ("704", PaymentError),
    ("710", PaymentError),
    ("721", PaymentError),
    ("722", PaymentError),
    ("723", PaymentError),
    ("724", PaymentError),
    ("731", PaymentError),
    ("732", PaymentError),
    ("733", PaymentError),
    ("734", PaymentError),
    ("887", PaymentError),
    ("888", PaymentError),
    ("880", PaymentError),
    ("890", PaymentError),
    ("891", PaymentError),
    ("923", PaymentError),
    ("944", PaymentError),
    ("945", PaymentError),
    ("962", PaymentError),
    ("1073", PaymentError),
    ("917", RefundError),
    ("1", TemporaryError),
    ("91", TemporaryError),
    ("909", TemporaryError),
    ("950", TemporaryError),
    ("990", TemporaryError),
    ("991", TemporaryError),
    ("6502", TemporaryError),
];

// Adyen refusalReasonCode values, plus the modification API error codes
// that describe merchant setup problems.
const ADYEN: CodeTable = &[
    ("2", PaymentError),
    ("3", PaymentError),
    ("4", TemporaryError),
    ("5", PaymentError),
    ("6", PaymentError),
    ("7", PaymentError),
    ("8", PaymentError),
    ("9", TemporaryError),
    ("10", ConfigurationError),
    ("11", PaymentError),
    ("12", PaymentError),
    ("14", PaymentError),
    ("15", PaymentError),
    ("16", PaymentError),
    ("17", PaymentError),
    ("18", PaymentError),
    ("19", PaymentError),
    ("20", PaymentError),
    ("21", TemporaryError),
    ("22", PaymentError),
    ("23", ConfigurationError),
    ("24", PaymentError),
    ("25", PaymentError),
    ("26", PaymentError),
    ("27", PaymentError),
    ("28", PaymentError),
    ("29", PaymentError),
    ("31", PaymentError),
    ("32", PaymentError),
    ("33", PaymentError),
    ("38", PaymentError),
    ("010", ConfigurationError),
    ("137", RefundError),
    ("167", RefundError),
    ("901", ConfigurationError),
    ("905", ConfigurationError),
];

// Processor response codes 2000..=2999 are declines and handled by range.
const BRAINTREE: CodeTable = &[
    ("3000", TemporaryError),
    ("gateway_rejected", PaymentError),
    ("fraud", PaymentError),
    ("cvv", PaymentError),
    ("avs", PaymentError),
    ("duplicate", PaymentError),
    ("91504", PaymentError),
    ("91506", RefundError),
    ("91512", RefundError),
    ("91521", RefundError),
    ("91530", RefundError),
    ("91577", ConfigurationError),
    ("93103", ConfigurationError),
];

const MOCK: CodeTable = &[
    ("MOCK_DECLINED", PaymentError),
    ("MOCK_REFUND_DECLINED", RefundError),
    ("MOCK_MISCONFIGURED", ConfigurationError),
    ("MOCK_UNAVAILABLE", TemporaryError),
];

/// Known provider codes and their canonical kind.
pub fn catalogue(psp: Psp) -> CodeTable {
    match psp {
        Psp::BsPayone => BS_PAYONE,
        Psp::Adyen => ADYEN,
        Psp::Braintree => BRAINTREE,
        Psp::Mock => MOCK,
    }
}

/// Total mapping from a provider error code to `PaymentErrorKind`.
pub fn map_provider_code(psp: Psp, code: &str) -> PaymentErrorKind {
    let code = code.trim();
    if let Some((_, kind)) = catalogue(psp).iter().find(|(c, _)| *c == code) {
        return *kind;
    }
    if psp == Psp::Braintree {
        if let Ok(n) = code.parse::<u32>() {
            if (2000..3000).contains(&n) {
                return PaymentError;
            }
        }
    }
    PaymentErrorKind::UnknownError
}
