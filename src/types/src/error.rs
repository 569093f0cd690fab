use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The exchange could not be reached, rejected the credentials or rejected the request.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// An upstream field could not be parsed into the normalized model.
    #[error("data error: unable to parse {field} from {value:?}")]
    Data { field: String, value: String },

    /// The exchange has no data for the requested symbol.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("market {market} has no symbol registered for exchange {exchange}")]
    MissingMarketMapping { market: String, exchange: String },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("{0} does not offer a market summary feed")]
    FeedUnsupported(String),
}

impl ExchangeError {
    pub fn data(field: impl Into<String>, value: impl ToString) -> ExchangeError {
        ExchangeError::Data {
            field: field.into(),
            value: value.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExchangeError::NotFound(_))
    }
}
