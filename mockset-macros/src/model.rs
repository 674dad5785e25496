//! Implementation of `#[derive(Model)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Ident, LitStr, Result, spanned::Spanned};

/// Container-level attributes from `#[model(...)]`.
#[derive(Default)]
struct ModelAttr {
    label: Option<String>,
    pk: Option<String>,
    get_latest_by: Option<String>,
}

impl ModelAttr {
    fn from_attrs(attrs: &[Attribute]) -> Result<Self> {
        let mut parsed = ModelAttr::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident("model")) {
            attr.parse_nested_meta(|meta| {
                let value = meta.value()?.parse::<LitStr>()?.value();

                if meta.path.is_ident("label") {
                    parsed.label = Some(value);
                } else if meta.path.is_ident("pk") {
                    parsed.pk = Some(value);
                } else if meta.path.is_ident("get_latest_by") {
                    parsed.get_latest_by = Some(value);
                } else {
                    return Err(meta.error("expected `label`, `pk` or `get_latest_by`"));
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}

/// Field-level attributes from `#[model(...)]`.
#[derive(Default)]
struct FieldAttr {
    skip: bool,
    rename: Option<String>,
}

impl FieldAttr {
    fn from_attrs(attrs: &[Attribute]) -> Result<Self> {
        let mut parsed = FieldAttr::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident("model")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    parsed.skip = true;
                } else if meta.path.is_ident("rename") {
                    parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error("expected `skip` or `rename`"));
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}

struct ModelField {
    ident: Ident,
    name: String,
}

pub fn model_derive_impl(input: DeriveInput) -> Result<TokenStream> {
    let ident = &input.ident;
    let attr = ModelAttr::from_attrs(&input.attrs)?;

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            other => {
                return Err(Error::new(
                    other.span(),
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new(
                input.span(),
                "Model can only be derived for structs",
            ));
        }
    };

    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Model cannot be derived for generic structs",
        ));
    }

    let mut fields = Vec::new();
    for field in named {
        let field_attr = FieldAttr::from_attrs(&field.attrs)?;
        if field_attr.skip {
            continue;
        }

        let Some(field_ident) = field.ident.clone() else {
            continue;
        };
        let name = field_attr
            .rename
            .unwrap_or_else(|| field_ident.to_string().trim_start_matches("r#").to_string());

        fields.push(ModelField {
            ident: field_ident,
            name,
        });
    }

    let label = attr.label.unwrap_or_else(|| ident.to_string());
    let pk = attr.pk.unwrap_or_else(|| "id".to_string());
    let get_latest_by = attr
        .get_latest_by
        .map(|field| quote! { .get_latest_by(#field) });

    let names = fields.iter().map(|field| &field.name).collect::<Vec<_>>();
    let idents = fields.iter().map(|field| &field.ident).collect::<Vec<_>>();

    Ok(quote! {
        impl ::mockset::manager::Managed for #ident {
            fn model_descriptor() -> ::mockset::descriptor::Descriptor {
                ::std::thread_local! {
                    static DESCRIPTOR: ::mockset::descriptor::Descriptor =
                        ::mockset::descriptor::Descriptor::builder()
                            .label(#label)
                            #(.field(#names))*
                            .pk(#pk)
                            #get_latest_by
                            .constructor(<#ident as ::std::default::Default>::default)
                            .build();
                }

                DESCRIPTOR.with(::std::clone::Clone::clone)
            }
        }

        impl ::mockset::model::Model for #ident {
            fn model_name(&self) -> ::std::string::String {
                ::std::string::String::from(#label)
            }

            fn descriptor(&self) -> ::std::option::Option<::mockset::descriptor::Descriptor> {
                ::std::option::Option::Some(
                    <Self as ::mockset::manager::Managed>::model_descriptor()
                )
            }

            fn field(&self, name: &str) -> ::std::option::Option<::mockset::value::Value> {
                match name {
                    #(#names => ::std::option::Option::Some(
                        ::mockset::value::Value::from(::std::clone::Clone::clone(&self.#idents))
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: ::mockset::value::Value,
            ) -> ::mockset::error::MockResult<()> {
                match name {
                    #(#names => {
                        self.#idents = ::mockset::value::FromValue::from_value(value)?;
                        ::std::result::Result::Ok(())
                    })*
                    _ => {
                        let choices: &[&str] = &[#(#names),*];
                        ::std::result::Result::Err(
                            ::mockset::error::MockError::unknown_field(name, choices)
                        )
                    }
                }
            }

            fn field_names(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![#(::std::string::String::from(#names)),*]
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }

        impl ::std::convert::From<#ident> for ::mockset::model::Item {
            fn from(model: #ident) -> Self {
                ::mockset::model::Item::new(model)
            }
        }
    })
}
