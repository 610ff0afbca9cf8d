use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr};

pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let event_name = match extract_event_name(&input) {
        Ok(event_name) => event_name,
        Err(err) => return err.to_compile_error().into(),
    };

    let id_field = match find_marked_field(&input, "event", "aggregate_id", &["aggregate_id", "id"])
    {
        Ok(field) => field,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl #impl_generics ::sourced_bus::Event for #name #ty_generics #where_clause {
            fn event_type(&self) -> &str {
                #event_name
            }

            fn aggregate_id(&self) -> ::std::string::String {
                ::std::string::ToString::to_string(&self.#id_field)
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_event_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("event") {
            continue;
        }

        let mut event_name = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                event_name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"`"))
            }
        })?;

        if let Some(n) = event_name {
            return Ok(n);
        }
    }

    Ok(input.ident.to_string())
}

/// Find the named field carrying `#[<attr>(<marker>)]`, falling back to the
/// first field whose name is in `fallbacks`.
pub(crate) fn find_marked_field(
    input: &DeriveInput,
    attr_name: &str,
    marker: &str,
    fallbacks: &[&str],
) -> syn::Result<Ident> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    format!("#[derive] with `{attr_name}` requires a struct with named fields"),
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                format!("#[derive] with `{attr_name}` only supports structs"),
            ))
        }
    };

    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident(attr_name) {
                continue;
            }
            let mut is_marked = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(marker) {
                    is_marked = true;
                    Ok(())
                } else {
                    Err(meta.error(format!("expected `{marker}`")))
                }
            })?;
            if is_marked {
                if let Some(ident) = &field.ident {
                    return Ok(ident.clone());
                }
            }
        }
    }

    for fallback in fallbacks {
        for field in fields {
            if let Some(ident) = &field.ident {
                if ident == fallback {
                    return Ok(ident.clone());
                }
            }
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        format!(
            "no field marked with #[{attr_name}({marker})] and no field named {}",
            fallbacks
                .iter()
                .map(|f| format!("`{f}`"))
                .collect::<Vec<_>>()
                .join(" or ")
        ),
    ))
}
