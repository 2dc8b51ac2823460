//! # Table Attribute Parsing
//!
//! Reads the struct-level `#[orm(...)]` attribute into [`TableAttrs`].

use syn::{Attribute, Expr, LitInt, LitStr};

/// Options collected from `#[orm(...)]` on the struct.
#[derive(Default)]
pub struct TableAttrs {
    pub table: Option<String>,
    pub auto_key: Option<String>,
    pub generated_key: Option<String>,
    pub primary_key: Vec<String>,
    pub columns: Vec<String>,
    pub cached: bool,
    pub expired: Option<i64>,
    pub generator: Option<Expr>,
}

/// Splits `"a, b ,c"` into trimmed, non-empty names.
fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

impl TableAttrs {
    pub fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = TableAttrs::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.table = Some(value.value());
                } else if meta.path.is_ident("auto_key") {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.auto_key = Some(value.value());
                } else if meta.path.is_ident("generated_key") {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.generated_key = Some(value.value());
                } else if meta.path.is_ident("primary_key") {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.primary_key = split_list(&value.value());
                } else if meta.path.is_ident("columns") {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.columns = split_list(&value.value());
                } else if meta.path.is_ident("cached") {
                    parsed.cached = true;
                } else if meta.path.is_ident("expired") {
                    let value: LitInt = meta.value()?.parse()?;
                    parsed.expired = Some(value.base10_parse::<i64>()?);
                } else if meta.path.is_ident("generator") {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.generator = Some(value.parse()?);
                } else {
                    return Err(meta.error("unknown orm option"));
                }
                Ok(())
            })?;
        }

        if parsed.auto_key.is_some() && parsed.generated_key.is_some() {
            return Err(syn::Error::new_spanned(
                attrs.iter().find(|a| a.path().is_ident("orm")),
                "`auto_key` and `generated_key` are mutually exclusive",
            ));
        }
        if parsed.generator.is_some() && parsed.generated_key.is_none() {
            return Err(syn::Error::new_spanned(
                attrs.iter().find(|a| a.path().is_ident("orm")),
                "`generator` requires `generated_key`",
            ));
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{parse_quote, DeriveInput};

    #[test]
    fn test_parses_every_option() {
        let ast: DeriveInput = parse_quote! {
            #[orm(table = "users", generated_key = "id", primary_key = "a, b", cached, expired = 60)]
            struct User(Record);
        };
        let attrs = TableAttrs::parse(&ast.attrs).unwrap();
        assert_eq!(attrs.table.as_deref(), Some("users"));
        assert_eq!(attrs.generated_key.as_deref(), Some("id"));
        assert_eq!(attrs.primary_key, vec!["a", "b"]);
        assert!(attrs.cached);
        assert_eq!(attrs.expired, Some(60));
    }

    #[test]
    fn test_both_key_strategies_are_rejected() {
        let ast: DeriveInput = parse_quote! {
            #[orm(auto_key = "id", generated_key = "uid")]
            struct User(Record);
        };
        assert!(TableAttrs::parse(&ast.attrs).is_err());

        let split: DeriveInput = parse_quote! {
            #[orm(generated_key = "uid")]
            #[orm(auto_key = "id")]
            struct User(Record);
        };
        assert!(TableAttrs::parse(&split.attrs).is_err());
    }

    #[test]
    fn test_generator_needs_generated_key() {
        let ast: DeriveInput = parse_quote! {
            #[orm(auto_key = "id", generator = "MyGen")]
            struct User(Record);
        };
        assert!(TableAttrs::parse(&ast.attrs).is_err());
    }
}
