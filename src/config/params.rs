use crate::{Error, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;

/// Runtime values for `${name}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Parse from CLI args like "key=value".
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            params.values.insert(key.to_string(), value.to_string());
        }
        Ok(params)
    }
}

/// Parameter definition in a profile.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,

    pub default: Option<String>,

    pub description: Option<String>,
}

const PLACEHOLDER: &str = r"\$\{([A-Za-z0-9_]+)\}";

/// Substitute `${name}` placeholders.
///
/// Supplied params win, then defaults. A required param with neither is an
/// error; an optional one becomes empty. Undeclared names are left as-is so
/// they can be filled in later (the download file name, for instance).
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let re = Regex::new(PLACEHOLDER)?;
    let mut missing = None;
    let out = re.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        if let Some(v) = params.get(name) {
            return v.to_string();
        }
        match defs.get(name) {
            Some(ParamDef {
                default: Some(d), ..
            }) => d.clone(),
            Some(def) if def.required => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
            Some(_) => String::new(),
            None => caps[0].to_string(),
        }
    });
    if let Some(name) = missing {
        return Err(Error::Config(format!("missing required parameter: {}", name)));
    }
    Ok(out.into_owned())
}

/// Recursively substitute params in a serde_yaml::Value.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute(s, params, defs)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(required: bool, default: Option<&str>) -> ParamDef {
        ParamDef {
            required,
            default: default.map(String::from),
            description: None,
        }
    }

    #[test]
    fn test_substitute_multiple() {
        let params = Params::new().set("a", "1").set("b", "2");
        let result = substitute("${a} + ${b} = 3", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "1 + 2 = 3");
    }

    #[test]
    fn test_substitute_default() {
        let defs = HashMap::from([("document".to_string(), def(false, Some("Signed Decision Notice")))]);
        let result = substitute("${document}", &Params::new(), &defs).unwrap();
        assert_eq!(result, "Signed Decision Notice");
    }

    #[test]
    fn test_supplied_beats_default() {
        let defs = HashMap::from([("out_dir".to_string(), def(false, Some("/tmp")))]);
        let params = Params::new().set("out_dir", "downloads");
        assert_eq!(substitute("${out_dir}", &params, &defs).unwrap(), "downloads");
    }

    #[test]
    fn test_substitute_required_missing() {
        let defs = HashMap::from([("key".to_string(), def(true, None))]);
        let err = substitute("x ${key}", &Params::new(), &defs).unwrap_err();
        assert!(err.to_string().contains("key"));
    }

    #[test]
    fn test_undeclared_left_in_place() {
        let result = substitute("DA_${application}.pdf", &Params::new(), &HashMap::new()).unwrap();
        assert_eq!(result, "DA_${application}.pdf");
    }

    #[test]
    fn test_params_from_args() {
        let args = vec!["out_dir=/data".to_string(), "document=Approved Plans".to_string()];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("out_dir"), Some("/data"));
        assert_eq!(params.get("document"), Some("Approved Plans"));
        assert!(Params::from_args(&["oops".to_string()]).is_err());
    }
}
