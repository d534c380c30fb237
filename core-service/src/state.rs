//! Loading/success/error wrapper emitted by repository streams.

use std::sync::Arc;

use crate::error::CoreError;

/// Progress of a cache-first load.
///
/// Streams start with `Loading` and then carry `Success` values as the local
/// store changes. `Error` is emitted when nothing could be served.
#[derive(Debug, Clone)]
pub enum State<T> {
    Loading,
    Success(T),
    Error(Arc<CoreError>),
}

impl<T> State<T> {
    pub(crate) fn error(error: impl Into<CoreError>) -> Self {
        State::Error(Arc::new(error.into()))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, State::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, State::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            State::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_success(self) -> Option<T> {
        match self {
            State::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> State<U> {
        match self {
            State::Loading => State::Loading,
            State::Success(value) => State::Success(f(value)),
            State::Error(error) => State::Error(error),
        }
    }
}
