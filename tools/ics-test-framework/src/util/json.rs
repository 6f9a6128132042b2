/*!
   Helpers for reading and patching loosely-typed JSON documents such as
   genesis files and CLI query output.

   Paths use the JSON pointer syntax, e.g. `/app_state/gov/params`.
*/

use serde_json::{Map, Value};

use crate::error::Error;

pub fn get_field<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value, Error> {
    value
        .pointer(pointer)
        .ok_or_else(|| Error::missing_json_field(pointer.to_string()))
}

pub fn get_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, Error> {
    get_field(value, pointer)?
        .as_str()
        .ok_or_else(|| Error::missing_json_field(pointer.to_string()))
}

/**
   Read an unsigned integer that may be encoded either as a JSON number
   or as a decimal string, as Cosmos SDK CLIs commonly do.
*/
pub fn get_u64(value: &Value, pointer: &str) -> Result<u64, Error> {
    let field = get_field(value, pointer)?;

    field
        .as_u64()
        .or_else(|| field.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| Error::missing_json_field(pointer.to_string()))
}

pub fn get_bool(value: &Value, pointer: &str) -> Result<bool, Error> {
    get_field(value, pointer)?
        .as_bool()
        .ok_or_else(|| Error::missing_json_field(pointer.to_string()))
}

/**
   Set the field at `pointer`, creating intermediate objects as needed.
*/
pub fn set_field(value: &mut Value, pointer: &str, new_value: Value) -> Result<(), Error> {
    let mut current = value;

    let segments: Vec<&str> = pointer.split('/').skip(1).collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| Error::missing_json_field(pointer.to_string()))?;

    for segment in parents {
        current = current
            .as_object_mut()
            .ok_or_else(|| Error::missing_json_field(pointer.to_string()))?
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    current
        .as_object_mut()
        .ok_or_else(|| Error::missing_json_field(pointer.to_string()))?
        .insert(last.to_string(), new_value);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_field_creates_parents() {
        let mut genesis = json!({ "app_state": { "gov": {} } });

        set_field(&mut genesis, "/app_state/gov/params/voting_period", json!("20s")).unwrap();
        set_field(&mut genesis, "/app_state/ccvconsumer", json!({ "new_chain": true })).unwrap();

        assert_eq!(
            get_str(&genesis, "/app_state/gov/params/voting_period").unwrap(),
            "20s"
        );
        assert!(get_bool(&genesis, "/app_state/ccvconsumer/new_chain").unwrap());
    }

    #[test]
    fn numbers_may_be_strings() {
        let output = json!({ "block": { "height": "42" }, "count": 7 });

        assert_eq!(get_u64(&output, "/block/height").unwrap(), 42);
        assert_eq!(get_u64(&output, "/count").unwrap(), 7);
        assert!(get_u64(&output, "/missing").is_err());
    }
}
