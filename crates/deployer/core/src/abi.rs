//! Lookup of ABI entries and coercion of string arguments into ABI values.

use crate::error::AbiError;

use alloy::primitives::Bytes;
use alloy_dyn_abi::{
    DynSolType,
    DynSolValue,
    FunctionExt,
    JsonAbiExt,
};
use alloy_json_abi::{
    Function,
    JsonAbi,
    Param,
    StateMutability,
};

type Result<T> = std::result::Result<T, AbiError>;

/// Finds the single function named `method` that takes `arity` inputs.
///
/// Overloads with a different input count are ignored; zero or several matches fail with
/// [`AbiError::BadAbiEntry`].
pub fn find_function<'a>(abi: &'a JsonAbi, method: &str, arity: usize) -> Result<&'a Function> {
    let candidates: Vec<&Function> = abi
        .functions
        .get(method)
        .into_iter()
        .flatten()
        .filter(|function| function.inputs.len() == arity)
        .collect();

    match candidates.as_slice() {
        [function] => Ok(*function),
        _ => {
            Err(AbiError::BadAbiEntry {
                method: method.to_string(),
                arity,
                matches: candidates.len(),
            })
        }
    }
}

/// Coerces each argument to the type of the matching input.
pub fn coerce_args<S: AsRef<str>>(inputs: &[Param], args: &[S]) -> Result<Vec<DynSolValue>> {
    std::iter::zip(inputs, args)
        .map(|(input, arg)| coerce_value(&input.selector_type(), arg.as_ref()))
        .collect()
}

/// Coerces a string to a [`DynSolValue`] of the given type.
pub fn coerce_value(ty: &str, arg: &str) -> Result<DynSolValue> {
    let sol_type = DynSolType::parse(ty).map_err(|err| {
        AbiError::Type {
            ty: ty.to_string(),
            source: err.into(),
        }
    })?;
    sol_type.coerce_str(arg).map_err(|source| {
        AbiError::Coerce {
            ty: ty.to_string(),
            value: arg.to_string(),
            source,
        }
    })
}

/// Encodes a call to `method`, selector included.
pub fn encode_call<S: AsRef<str>>(abi: &JsonAbi, method: &str, args: &[S]) -> Result<Bytes> {
    let function = find_function(abi, method, args.len())?;
    encode_function(function, args)
}

/// Encodes a call to an already resolved function, selector included.
pub fn encode_function<S: AsRef<str>>(function: &Function, args: &[S]) -> Result<Bytes> {
    let values = coerce_args(&function.inputs, args)?;
    Ok(function.abi_encode_input(&values)?.into())
}

/// Encodes constructor arguments to append to creation bytecode.
///
/// ABIs without a constructor accept no arguments.
pub fn encode_constructor<S: AsRef<str>>(abi: &JsonAbi, args: &[S]) -> Result<Bytes> {
    let inputs = abi
        .constructor()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();

    if inputs.len() != args.len() {
        return Err(AbiError::ConstructorArity {
            expected: inputs.len(),
            actual: args.len(),
        });
    }
    if inputs.is_empty() {
        return Ok(Bytes::new());
    }

    let values = coerce_args(inputs, args)?;
    Ok(DynSolValue::Tuple(values).abi_encode_params().into())
}

/// Decodes the return data of a call.
pub fn decode_output(function: &Function, data: &[u8]) -> Result<Vec<DynSolValue>> {
    Ok(function.abi_decode_output(data)?)
}

/// Whether calling the function never needs a transaction.
pub fn is_read_only(function: &Function) -> bool {
    matches!(
        function.state_mutability,
        StateMutability::Pure | StateMutability::View
    )
}

/// Renders a decoded value for terminal output.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", alloy::hex::encode(&word[..*size])),
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Bytes(bytes) => format!("0x{}", alloy::hex::encode(bytes)),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => {
            let inner: Vec<String> = values.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        other => format!("{other:?}"),
    }
}
