use syn::parse::{Parse, ParseStream};
use syn::{Error, LitStr, Token};

#[derive(Default)]
pub struct EntryPointAttributes {
    pub class: Option<LitStr>,
}

impl Parse for EntryPointAttributes {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut result = Self::default();
        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(kw::class) {
                if result.class.is_some() {
                    return Err(Error::new(input.span(), "Class is already defined!"));
                }

                result.class = Some(input.parse::<LitArg<kw::class, LitStr>>()?.value);
            } else if lookahead.peek(Token![,]) {
                let _ = input.parse::<Token![,]>()?;
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(result)
    }
}

struct LitArg<T, A> {
    value: A,
    _p: std::marker::PhantomData<T>,
}

impl<T: Parse, A: Parse> Parse for LitArg<T, A> {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let _ = input.parse::<T>()?;
        let _ = input.parse::<Token![=]>()?;
        let value = input.parse()?;
        Ok(Self {
            value,
            _p: std::marker::PhantomData,
        })
    }
}

mod kw {
    use syn::custom_keyword;

    custom_keyword!(class);
}
