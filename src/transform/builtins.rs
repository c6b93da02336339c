//! The built-in transformer set: `identity`, `zstd`, `aesgcm`, and the two
//! literal test transformers spec scenarios exercise, `testplus`/`testxor`.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transform::{Factory, Registry, TransformFn};

pub fn register_defaults(registry: &Registry) {
    registry.init("identity", identity_factory(), identity_factory());
    registry.init("zstd", zstd_forward_factory(), zstd_inverse_factory());
    registry.init("aesgcm", aesgcm_forward_factory(), aesgcm_inverse_factory());
    registry.init("testplus", testplus_forward_factory(), testplus_inverse_factory());
    registry.init("testxor", testxor_factory(), testxor_factory());
}

fn identity_factory() -> Factory {
    Box::new(|_config: &str| -> Result<TransformFn> {
        Ok(Arc::new(|_scratch, inputs| Ok(inputs.concat())))
    })
}

fn zstd_forward_factory() -> Factory {
    Box::new(|config: &str| -> Result<TransformFn> {
        let level = parse_level(config)?;
        Ok(Arc::new(move |_scratch, inputs| {
            let joined = inputs.concat();
            zstd::stream::encode_all(joined.as_slice(), level)
                .map_err(|e| Error::TransformFailure(format!("zstd encode: {e}")))
        }))
    })
}

fn zstd_inverse_factory() -> Factory {
    Box::new(|_config: &str| -> Result<TransformFn> {
        Ok(Arc::new(|_scratch, inputs| {
            let joined = inputs.concat();
            zstd::stream::decode_all(joined.as_slice())
                .map_err(|e| Error::TransformFailure(format!("zstd decode: {e}")))
        }))
    })
}

fn parse_level(config: &str) -> Result<i32> {
    if config.trim().is_empty() {
        return Ok(3);
    }
    config
        .trim()
        .parse::<i32>()
        .map_err(|e| Error::TransformFailure(format!("bad zstd level {config:?}: {e}")))
}

fn aesgcm_forward_factory() -> Factory {
    Box::new(|config: &str| -> Result<TransformFn> {
        let key = crate::crypto::parse_key(config)?;
        Ok(Arc::new(move |_scratch, inputs| {
            let joined = inputs.concat();
            crate::crypto::encrypt(&key, &joined)
        }))
    })
}

fn aesgcm_inverse_factory() -> Factory {
    Box::new(|config: &str| -> Result<TransformFn> {
        let key = crate::crypto::parse_key(config)?;
        Ok(Arc::new(move |_scratch, inputs| {
            let joined = inputs.concat();
            crate::crypto::decrypt(&key, &joined)
        }))
    })
}

fn testplus_forward_factory() -> Factory {
    Box::new(|config: &str| -> Result<TransformFn> {
        let n = parse_byte_arg(config)?;
        Ok(Arc::new(move |_scratch, inputs| {
            Ok(inputs.concat().into_iter().map(|b| b.wrapping_add(n)).collect())
        }))
    })
}

fn testplus_inverse_factory() -> Factory {
    Box::new(|config: &str| -> Result<TransformFn> {
        let n = parse_byte_arg(config)?;
        Ok(Arc::new(move |_scratch, inputs| {
            Ok(inputs.concat().into_iter().map(|b| b.wrapping_sub(n)).collect())
        }))
    })
}

fn testxor_factory() -> Factory {
    Box::new(|config: &str| -> Result<TransformFn> {
        let n = parse_byte_arg(config)?;
        Ok(Arc::new(move |_scratch, inputs| {
            Ok(inputs.concat().into_iter().map(|b| b ^ n).collect())
        }))
    })
}

fn parse_byte_arg(config: &str) -> Result<u8> {
    config
        .trim()
        .parse::<u32>()
        .map_err(|e| Error::TransformFailure(format!("bad test transformer arg {config:?}: {e}")))
        .map(|n| (n & 0xFF) as u8)
}
