use lbscope_common::KernelEnum;

use super::ValueChannel;
use crate::error::{DecodeError, DecodeResult};
use crate::target::ControlChannel;

impl<C: ControlChannel + ?Sized> ValueChannel<'_, C> {
    /// Reads an enum-typed expression and resolves its printed symbol.
    pub fn read_enum<T: KernelEnum>(&mut self, expr: &str) -> DecodeResult<T> {
        let name = self.read_value(expr)?;
        T::from_symbol(&name).ok_or_else(|| DecodeError::UnknownSymbol {
            kind: T::KIND,
            name,
            expr: expr.to_string(),
        })
    }
}
