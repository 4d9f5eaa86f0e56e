use crate::proto::Type;
use crate::stack::{Stack, StackValue};

use super::{SignatureError, MAX_CONTAINER_DEPTH, MAX_DEPTH};

#[derive(Default, Debug, Clone, Copy)]
#[repr(u8)]
pub(super) enum Kind {
    #[default]
    None,
    Array,
    Struct,
    Dict,
}

impl StackValue for (Kind, u8) {
    const DEFAULT: Self = (Kind::None, 0);
}

/// Validate that `bytes` is a sequence of complete D-Bus types.
///
/// Dict entries are only accepted as the immediate element type of an array.
pub(crate) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    use SignatureError::*;

    if bytes.len() > u8::MAX as usize {
        return Err(SignatureTooLong);
    }

    let mut stack = Stack::<(Kind, u8), MAX_DEPTH>::new();
    let mut arrays = 0;
    let mut structs = 0;
    let mut n = 0;

    while n < bytes.len() {
        let b = bytes[n];
        n += 1;
        let t = Type(b);

        let mut is_basic = match t {
            Type::BYTE
            | Type::BOOLEAN
            | Type::INT16
            | Type::UINT16
            | Type::INT32
            | Type::UINT32
            | Type::INT64
            | Type::UINT64
            | Type::DOUBLE
            | Type::STRING
            | Type::OBJECT_PATH
            | Type::SIGNATURE
            | Type::UNIX_FD => true,
            Type::VARIANT => false,
            Type::ARRAY => {
                if !stack_try_push!(stack, (Kind::Array, 0)) || arrays == MAX_CONTAINER_DEPTH {
                    return Err(ExceededMaximumArrayRecursion);
                }

                arrays += 1;
                continue;
            }
            Type::OPEN_PAREN => {
                if !stack_try_push!(stack, (Kind::Struct, 0)) || structs == MAX_CONTAINER_DEPTH {
                    return Err(ExceededMaximumStructRecursion);
                }

                structs += 1;
                continue;
            }
            Type::CLOSE_PAREN => {
                let fields = match stack_pop!(stack, (Kind, u8)) {
                    Some((Kind::Struct, fields)) => fields,
                    Some((Kind::Array, _)) => return Err(MissingArrayElementType),
                    _ => return Err(StructEndedButNotStarted),
                };

                if fields == 0 {
                    return Err(StructHasNoFields);
                }

                structs -= 1;
                false
            }
            Type::OPEN_BRACE => {
                if !stack_try_push!(stack, (Kind::Dict, 0)) {
                    return Err(ExceededMaximumDictRecursion);
                }

                continue;
            }
            Type::CLOSE_BRACE => {
                let fields = match stack_pop!(stack, (Kind, u8)) {
                    Some((Kind::Dict, fields)) => fields,
                    Some((Kind::Array, _)) => return Err(MissingArrayElementType),
                    _ => return Err(DictEndedButNotStarted),
                };

                match fields {
                    0 => return Err(DictEntryHasNoFields),
                    1 => return Err(DictEntryHasOnlyOneField),
                    2 => {}
                    _ => return Err(DictEntryHasTooManyFields),
                }

                if !matches!(stack_peek!(stack), Some((Kind::Array, _))) {
                    return Err(DictEntryNotInsideArray);
                }

                false
            }
            _ => return Err(UnknownTypeCode),
        };

        // A complete type closes every array immediately enclosing it.
        while matches!(stack_peek!(stack), Some((Kind::Array, _))) {
            stack_pop!(stack, (Kind, u8));
            arrays -= 1;
            is_basic = false;
        }

        if !is_basic {
            if let Some((Kind::Dict, 0)) = stack_peek!(stack) {
                return Err(DictKeyMustBeBasicType);
            }
        }

        if let Some((kind, fields)) = stack_pop!(stack, (Kind, u8)) {
            stack_try_push!(stack, (kind, fields + 1));
        }
    }

    match stack_pop!(stack, (Kind, u8)) {
        Some((Kind::Array, _)) => Err(MissingArrayElementType),
        Some((Kind::Struct, _)) => Err(StructStartedButNotEnded),
        Some((Kind::Dict, _)) => Err(DictStartedButNotEnded),
        _ => Ok(()),
    }
}
