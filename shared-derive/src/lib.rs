//! Derive macros for field-less enums that are stored as primitive integers on the wire
//!
//! `#[derive(U8Enum)]` on a `#[repr(u8)]` enum generates `TryFrom<u8>`, failing with
//! `shared::primitive_enum::InvalidValue` for values without a variant, and `From<Enum>`
//! for `u8`. The same exists for the other primitive integer types.
extern crate proc_macro;

use paste::paste;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

macro_rules! primitive_enum {
    ($type:ident) => {
        paste! {
        #[proc_macro_derive([<$type:camel Enum>])]
        pub fn [<derive_ $type _enum>](input: TokenStream) -> TokenStream {
            let DeriveInput { ident, data, .. } = parse_macro_input!(input);

            let data = match data {
                syn::Data::Enum(data) => data,
                _ => {
                    return syn::Error::new(
                        ident.span(),
                        "primitive enum derives are only allowed on enums",
                    )
                    .to_compile_error()
                    .into();
                }
            };

            let variants = data
                .variants
                .iter()
                .filter_map(|variant| {
                    let (_, disc) = variant.discriminant.as_ref()?;
                    let var = &variant.ident;
                    Some(quote! {
                        #disc => Ok(#ident::#var)
                    })
                });

            let output = quote! {
                impl TryFrom<$type> for #ident {
                    type Error = shared::primitive_enum::InvalidValue<$type>;

                    fn try_from(value: $type) -> Result<Self, Self::Error> {
                        match value {
                            #(#variants,)*
                            v => Err(shared::primitive_enum::InvalidValue { value: v })
                        }
                    }
                }

                impl From<#ident> for $type {
                    fn from(value: #ident) -> $type {
                        value as $type
                    }
                }
            };
            output.into()
        }
        }
    };
}

primitive_enum!(u8);
primitive_enum!(u16);
primitive_enum!(u32);
primitive_enum!(u64);
