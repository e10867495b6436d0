use proc_macro2::{Literal, TokenStream};
use quote::quote;
use syn::{Error, Result};

const INPUT_TYPE_ERROR: &str = "Reflect can only be derived from structs with named fields";

pub(crate) fn derive(input: TokenStream) -> Result<TokenStream> {
    let input: syn::DeriveInput = syn::parse2(input)?;

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Reflect cannot be derived for generic types because the property table is a constant",
        ));
    }

    let fields: Vec<&syn::Field> = match &input.data {
        syn::Data::Struct(item) => match &item.fields {
            syn::Fields::Named(fields) => fields.named.iter().collect(),
            syn::Fields::Unit => Vec::new(),
            syn::Fields::Unnamed(fields) => {
                return Err(Error::new_spanned(fields, INPUT_TYPE_ERROR))
            }
        },
        syn::Data::Enum(item) => return Err(Error::new_spanned(item.enum_token, INPUT_TYPE_ERROR)),
        syn::Data::Union(item) => {
            return Err(Error::new_spanned(item.union_token, INPUT_TYPE_ERROR))
        }
    };

    let mut idents = Vec::new();
    let mut names = Vec::new();
    let mut types = Vec::new();

    for field in fields {
        if is_skipped(&field.attrs)? {
            continue;
        }

        let ident = field.ident.as_ref().expect("named fields");
        names.push(ident.to_string());
        idents.push(ident);
        types.push(&field.ty);
    }

    let indices: Vec<_> = (0..idents.len()).map(Literal::usize_unsuffixed).collect();

    let ident = &input.ident;
    let ident_str = ident.to_string();

    Ok(quote! {
        impl ::tessera::property::Reflect for #ident {
            fn properties() -> &'static [::tessera::property::PropertyInfo] {
                const PROPERTIES: &[::tessera::property::PropertyInfo] = &[
                    #(
                        ::tessera::property::PropertyInfo {
                            name: #names,
                            kind: <#types as ::tessera::property::Property>::KIND,
                        },
                    )*
                ];
                PROPERTIES
            }

            fn get_by_index(
                &self,
                index: usize,
            ) -> ::std::option::Option<::tessera::property::Value> {
                match index {
                    #(
                        #indices => ::std::option::Option::Some(
                            ::tessera::property::Property::to_value(&self.#idents),
                        ),
                    )*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set_by_index(
                &mut self,
                index: usize,
                value: ::tessera::property::Value,
            ) -> ::std::result::Result<(), ::tessera::property::Kind> {
                match index {
                    #(
                        #indices => {
                            self.#idents =
                                <#types as ::tessera::property::Property>::from_value(value)
                                    .ok_or(<#types as ::tessera::property::Property>::KIND)?;
                            ::std::result::Result::Ok(())
                        }
                    )*
                    _ => panic!("Property index {} is out of range for {}", index, #ident_str),
                }
            }
        }
    })
}

fn is_skipped(attrs: &[syn::Attribute]) -> Result<bool> {
    let mut skip = false;

    for attr in attrs {
        if attr.path().is_ident("reflect") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported reflect option"))
                }
            })?;
        }
    }

    Ok(skip)
}
