use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use std::time::Duration;
use syn::{
    FnArg, ItemFn, LitStr, Pat, PatType, Result, ReturnType, Token, Type, parse::Parse,
    parse::ParseStream, parse_macro_input,
};

/// Attribute arguments for the fetcher macro
#[derive(Default)]
struct FetcherArgs {
    revalidate: Option<Duration>,
    namespace: Option<LitStr>,
}

impl Parse for FetcherArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = FetcherArgs::default();

        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "revalidate" => {
                    let lit: LitStr = input.parse()?;
                    let duration = humantime::parse_duration(&lit.value()).map_err(|e| {
                        syn::Error::new_spanned(&lit, format!("Invalid duration format: {e}"))
                    })?;
                    args.revalidate = Some(duration);
                }
                "namespace" => {
                    let lit: LitStr = input.parse()?;
                    if lit.value().is_empty() {
                        return Err(syn::Error::new_spanned(lit, "Namespace must not be empty"));
                    }
                    args.namespace = Some(lit);
                }
                _ => return Err(syn::Error::new_spanned(ident, "Unknown argument")),
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(args)
    }
}

/// Turn an async function into a cached, coalesced fetcher
///
/// The function must be `async`, take plain named parameters and return
/// `Result<T, E>`. The macro generates a unit struct named after the function
/// in PascalCase that implements `request_store::fetcher::Fetcher`, plus a
/// function with the original name returning that struct.
///
/// # Supported Arguments
/// - `revalidate = "10s"` - How long a successful result stays fresh. Omitted
///   or zero means fetch once and refetch only on an explicit refresh.
/// - `namespace = "prices"` - Key namespace. Defaults to the struct's type name.
///
/// # Arguments and keys
/// - No parameters: `Fetcher<()>`
/// - One parameter `x: T`: `Fetcher<T>`
/// - Several parameters: `Fetcher<(T1, T2, ...)>`, in declaration order
///
/// Parameter types must be `Clone + Serialize + Debug + Send + Sync + 'static`;
/// the cache key is derived from the serialized arguments.
///
/// # Examples
/// ```rust,ignore
/// #[fetcher(revalidate = "10s")]
/// async fn last_price(symbol: String) -> Result<Quote, String> {
///     // Implementation
/// }
///
/// #[fetcher(namespace = "candles")]
/// async fn candles(symbol: String, limit: u32) -> Result<Vec<Candle>, String> {
///     // Implementation
/// }
///
/// let quote = store.subscribe(last_price(), "BTCUSDT".to_string())?;
/// let history = store.subscribe(candles(), ("BTCUSDT".to_string(), 50u32))?;
/// ```
#[proc_macro_attribute]
pub fn fetcher(args: TokenStream, input: TokenStream) -> TokenStream {
    let fetcher_args = if args.is_empty() {
        FetcherArgs::default()
    } else {
        match syn::parse(args) {
            Ok(args) => args,
            Err(err) => return err.to_compile_error().into(),
        }
    };

    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_fetcher(input_fn, fetcher_args) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_fetcher(input_fn: ItemFn, fetcher_args: FetcherArgs) -> Result<TokenStream2> {
    validate_signature(&input_fn)?;
    let info = extract_fetcher_info(&input_fn)?;
    let params = extract_all_params(&input_fn)?;

    let FetcherInfo {
        fn_vis,
        fn_block,
        output_type,
        error_type,
        struct_name,
        call_attrs,
        ..
    } = &info;

    let common_struct = generate_common_struct_and_fn(&info);
    let revalidate_impl = generate_revalidate_impl(fetcher_args.revalidate);
    let namespace_impl = generate_namespace_impl(fetcher_args.namespace.as_ref());
    let input_type = build_input_type(&params);

    let param_names: Vec<_> = params.iter().map(|p| &p.name).collect();
    let param_types: Vec<_> = params.iter().map(|p| &p.ty).collect();

    // Unpack the trait's single argument into the function's parameter list
    let run_body = match params.len() {
        0 => quote! {
            fn run(&self, _args: ()) -> impl ::std::future::Future<Output = Result<Self::Output, Self::Error>> + Send {
                Self::call()
            }
        },
        1 => {
            let name = param_names[0];
            quote! {
                fn run(&self, #name: #input_type) -> impl ::std::future::Future<Output = Result<Self::Output, Self::Error>> + Send {
                    Self::call(#name)
                }
            }
        }
        _ => quote! {
            fn run(&self, args: #input_type) -> impl ::std::future::Future<Output = Result<Self::Output, Self::Error>> + Send {
                let (#(#param_names,)*) = args;
                Self::call(#(#param_names,)*)
            }
        },
    };

    Ok(quote! {
        #common_struct

        impl #struct_name {
            #(#call_attrs)*
            #fn_vis async fn call(#(#param_names: #param_types,)*) -> Result<#output_type, #error_type> {
                #fn_block
            }
        }

        impl ::request_store::fetcher::Fetcher<#input_type> for #struct_name {
            type Output = #output_type;
            type Error = #error_type;

            #run_body
            #namespace_impl
            #revalidate_impl
        }
    })
}

/// Generate the revalidate interval override, if one was given
fn generate_revalidate_impl(duration: Option<Duration>) -> TokenStream2 {
    match duration {
        Some(duration) => {
            let secs = duration.as_secs();
            let nanos = duration.subsec_nanos();
            quote! {
                fn revalidate_interval(&self) -> ::std::time::Duration {
                    ::std::time::Duration::new(#secs, #nanos)
                }
            }
        }
        None => quote! {},
    }
}

/// Generate the namespace override, if one was given
fn generate_namespace_impl(namespace: Option<&LitStr>) -> TokenStream2 {
    match namespace {
        Some(namespace) => quote! {
            fn namespace(&self) -> &str {
                #namespace
            }
        },
        None => quote! {},
    }
}

/// Information extracted from the fetcher function
struct FetcherInfo {
    fn_vis: syn::Visibility,
    /// Doc comments, placed on the generated struct
    doc_attrs: Vec<syn::Attribute>,
    /// Every other attribute, kept on the function body as `call`
    call_attrs: Vec<syn::Attribute>,
    fn_block: Box<syn::Block>,
    output_type: Type,
    error_type: Type,
    struct_name: syn::Ident,
    fn_name: syn::Ident,
}

/// Information about a function parameter
struct ParamInfo {
    name: syn::Ident,
    ty: Type,
}

fn validate_signature(input_fn: &ItemFn) -> Result<()> {
    let sig = &input_fn.sig;
    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            sig.fn_token,
            "Fetcher functions must be async",
        ));
    }
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "Generic fetcher functions are not supported",
        ));
    }
    Ok(())
}

/// Extract fetcher information from the input function
fn extract_fetcher_info(input_fn: &ItemFn) -> Result<FetcherInfo> {
    let fn_name = input_fn.sig.ident.clone();
    let (output_type, error_type) = extract_result_types(&input_fn.sig.output)?;
    let struct_name = syn::Ident::new(
        &to_pascal_case(&fn_name.to_string()),
        proc_macro2::Span::call_site(),
    );

    let (doc_attrs, call_attrs) = split_doc_attrs(&input_fn.attrs);

    Ok(FetcherInfo {
        fn_vis: input_fn.vis.clone(),
        doc_attrs,
        call_attrs,
        fn_block: input_fn.block.clone(),
        output_type,
        error_type,
        struct_name,
        fn_name,
    })
}

fn split_doc_attrs(attrs: &[syn::Attribute]) -> (Vec<syn::Attribute>, Vec<syn::Attribute>) {
    attrs
        .iter()
        .cloned()
        .partition(|attr| attr.path().is_ident("doc"))
}

/// Generate the fetcher struct and the constructor function named after it
fn generate_common_struct_and_fn(info: &FetcherInfo) -> TokenStream2 {
    let FetcherInfo {
        fn_vis,
        doc_attrs,
        struct_name,
        fn_name,
        ..
    } = info;

    quote! {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        #(#doc_attrs)*
        #fn_vis struct #struct_name;

        #fn_vis fn #fn_name() -> #struct_name {
            #struct_name
        }
    }
}

/// Extract all parameters from the function signature
fn extract_all_params(input_fn: &ItemFn) -> Result<Vec<ParamInfo>> {
    let mut params = Vec::new();

    for input in &input_fn.sig.inputs {
        match input {
            FnArg::Typed(PatType { pat, ty, .. }) => {
                if let Pat::Ident(pat_ident) = &**pat {
                    params.push(ParamInfo {
                        name: pat_ident.ident.clone(),
                        ty: (**ty).clone(),
                    });
                } else {
                    return Err(syn::Error::new_spanned(
                        pat,
                        "Only simple parameter names are supported",
                    ));
                }
            }
            FnArg::Receiver(_) => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Methods with self parameter are not supported",
                ));
            }
        }
    }

    Ok(params)
}

/// Build the argument type: () for 0 params, T for 1 param, (T1, T2, ...) for N params
fn build_input_type(params: &[ParamInfo]) -> TokenStream2 {
    match params {
        [] => quote! { () },
        [single] => {
            let ty = &single.ty;
            quote! { #ty }
        }
        _ => {
            let types: Vec<_> = params.iter().map(|p| &p.ty).collect();
            quote! { (#(#types,)*) }
        }
    }
}

/// Extract `T` and `E` from a `Result<T, E>` return type
fn extract_result_types(return_type: &ReturnType) -> Result<(Type, Type)> {
    let not_result = || {
        syn::Error::new_spanned(return_type, "Fetcher functions must return Result<T, E>")
    };

    let ReturnType::Type(_, ty) = return_type else {
        return Err(not_result());
    };
    let Type::Path(type_path) = &**ty else {
        return Err(not_result());
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Err(not_result());
    };
    if segment.ident != "Result" {
        return Err(not_result());
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return Err(not_result());
    };

    let types: Vec<Type> = args
        .args
        .iter()
        .filter_map(|arg| match arg {
            syn::GenericArgument::Type(ty) => Some(ty.clone()),
            _ => None,
        })
        .collect();

    match <[Type; 2]>::try_from(types) {
        Ok([output_type, error_type]) => Ok((output_type, error_type)),
        Err(_) => Err(syn::Error::new_spanned(
            args,
            "Result must have exactly two type arguments",
        )),
    }
}

/// Convert a string to PascalCase
fn to_pascal_case(s: &str) -> String {
    let mut result = String::new();
    let mut capitalize_next = true;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_names() {
        assert_eq!(to_pascal_case("last_price"), "LastPrice");
        assert_eq!(to_pascal_case("quote"), "Quote");
        assert_eq!(to_pascal_case("fetch_24h_stats"), "Fetch24hStats");
    }

    #[test]
    fn parses_attribute_arguments() {
        let args: FetcherArgs = syn::parse_str(r#"revalidate = "1m 30s", namespace = "prices""#)
            .expect("valid arguments");
        assert_eq!(args.revalidate, Some(Duration::from_secs(90)));
        assert_eq!(args.namespace.map(|lit| lit.value()), Some("prices".to_string()));

        assert!(syn::parse_str::<FetcherArgs>(r#"interval = "1s""#).is_err());
        assert!(syn::parse_str::<FetcherArgs>(r#"revalidate = "soon""#).is_err());
    }

    #[test]
    fn extracts_result_types() {
        let item: ItemFn = syn::parse_quote! {
            async fn last_price(symbol: String) -> Result<Vec<u8>, String> { todo!() }
        };
        let (output, error) = extract_result_types(&item.sig.output).expect("result types");
        assert_eq!(quote!(#output).to_string(), quote!(Vec<u8>).to_string());
        assert_eq!(quote!(#error).to_string(), quote!(String).to_string());

        let item: ItemFn = syn::parse_quote! {
            async fn last_price() -> Option<u8> { None }
        };
        assert!(extract_result_types(&item.sig.output).is_err());
    }

    #[test]
    fn rejects_sync_and_generic_functions() {
        let sync_fn: ItemFn = syn::parse_quote! {
            fn last_price() -> Result<u8, ()> { Ok(1) }
        };
        assert!(generate_fetcher(sync_fn, FetcherArgs::default()).is_err());

        let generic_fn: ItemFn = syn::parse_quote! {
            async fn last_price<T>() -> Result<u8, ()> { Ok(1) }
        };
        assert!(generate_fetcher(generic_fn, FetcherArgs::default()).is_err());
    }

    #[test]
    fn only_doc_comments_move_to_the_struct() {
        let item: ItemFn = syn::parse_quote! {
            /// Last traded price
            #[allow(clippy::unused_async)]
            #[inline]
            async fn last_price(symbol: String) -> Result<String, String> { Ok(symbol) }
        };
        let info = extract_fetcher_info(&item).expect("fetcher info");
        assert_eq!(info.doc_attrs.len(), 1);
        assert_eq!(info.call_attrs.len(), 2);

        let common = generate_common_struct_and_fn(&info).to_string();
        assert!(common.contains("Last traded price"));
        assert!(!common.contains("inline"));
        assert!(!common.contains("clippy"));

        let expanded = generate_fetcher(item, FetcherArgs::default())
            .expect("expands")
            .to_string();
        let call = expanded.find("async fn call").expect("call method");
        let inline = expanded.find("# [inline]").expect("inline kept");
        assert!(inline < call);
        assert!(expanded[..inline].contains("impl LastPrice"));
    }
}
