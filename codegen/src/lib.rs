use proc_macro::TokenStream;

mod reflect;

#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn reflect(input: TokenStream) -> TokenStream {
    reflect::derive(input.into()).unwrap_or_else(|err| err.to_compile_error()).into()
}
