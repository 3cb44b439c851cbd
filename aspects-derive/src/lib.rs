use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{
    Attribute, Error, Expr, Fields, GenericParam, Generics, Ident, Index, Item, ItemEnum,
    ItemStruct, Lit, LitStr, Member, Meta, Result, Type,
};

/// Implements `Describe` for structs and fieldless enums.
///
/// Named structs become maps, tuple structs arrays, unit structs empty
/// nodes and enums the name of their variant.
#[proc_macro_derive(Describe, attributes(reflect))]
pub fn derive_describe(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    entry(input, Derive::Describe)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Implements `Reflect` for a struct with named fields.
///
/// On the struct: `#[reflect(name = "...")]`, `#[reflect(slots(a, b))]`
/// and `#[reflect(update)]`. On fields: `#[reflect(extends)]` for the
/// embedded super class, `#[reflect(skip)]`, `#[reflect(read_only)]` and
/// `#[reflect(rename = "...")]`. Doc comments become descriptions.
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    entry(input, Derive::Reflect)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[derive(Clone, Copy)]
enum Derive {
    Describe,
    Reflect,
}

fn entry(input: proc_macro::TokenStream, derive: Derive) -> Result<TokenStream> {
    let input = syn::parse::<Item>(input)?;
    let output = match (&input, derive) {
        (Item::Struct(s), Derive::Describe) => describe_struct(s)?,
        (Item::Enum(e), Derive::Describe) => describe_enum(e)?,
        (Item::Struct(s), Derive::Reflect) => reflect_struct(s)?,
        (x, _) => return Err(Error::new(x.span(), "unsupported item")),
    };

    Ok(quote! {
        #[allow(unused_mut)]
        const _: () = { #output };
    })
}

#[derive(Default)]
struct ContainerAttrs {
    name: Option<LitStr>,
    slots: Vec<Ident>,
    update: bool,
}

#[derive(Default)]
struct FieldAttrs {
    extends: bool,
    skip: bool,
    read_only: bool,
    rename: Option<LitStr>,
}

fn container_attrs(attrs: &[Attribute]) -> Result<ContainerAttrs> {
    let mut out = ContainerAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("reflect")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                out.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("update") {
                out.update = true;
            } else if meta.path.is_ident("slots") {
                meta.parse_nested_meta(|slot| {
                    let ident = slot
                        .path
                        .get_ident()
                        .ok_or_else(|| slot.error("expected a method name"))?;
                    out.slots.push(ident.clone());
                    Ok(())
                })?;
            } else {
                return Err(meta.error("unknown reflect attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("reflect")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("extends") {
                out.extends = true;
            } else if meta.path.is_ident("skip") {
                out.skip = true;
            } else if meta.path.is_ident("read_only") {
                out.read_only = true;
            } else if meta.path.is_ident("rename") {
                out.rename = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown reflect attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// The `///` lines of an item, trimmed and joined.
fn doc(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) if nv.path.is_ident("doc") => match &nv.value {
                Expr::Lit(expr) => match &expr.lit {
                    Lit::Str(text) => Some(text.value().trim().to_owned()),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Adds `T: Describe` to every type parameter.
fn describe_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    for param in &mut generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(syn::parse_quote!(::aspects::Describe));
        }
    }
    generics
}

fn type_name(ident: &Ident, generics: &Generics) -> TokenStream {
    let params: Vec<&Ident> = generics.type_params().map(|param| &param.ident).collect();
    if params.is_empty() {
        return quote!(::std::borrow::Cow::Borrowed(stringify!(#ident)));
    }
    let pieces = params
        .iter()
        .map(|param| quote!(<#param as ::aspects::Describe>::type_name()));
    quote! {
        ::std::borrow::Cow::Owned(::std::format!(
            "{}<{}>",
            stringify!(#ident),
            [#(#pieces),*].join(", ")
        ))
    }
}

struct DescribedField {
    member: Member,
    key: String,
}

fn describe_struct(s: &ItemStruct) -> Result<TokenStream> {
    let ident = &s.ident;
    let generics = describe_bounds(&s.generics);
    let (impl_generics, type_generics, where_clause) = generics.split_for_impl();
    let name = type_name(ident, &s.generics);

    let mut fields = Vec::new();
    for (i, field) in s.fields.iter().enumerate() {
        let attrs = field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        if attrs.extends || attrs.read_only {
            return Err(Error::new(field.span(), "only `skip` and `rename` apply to value types"));
        }
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(Index::from(i)),
        };
        let key = match (&attrs.rename, &field.ident) {
            (Some(rename), _) => rename.value(),
            (None, Some(ident)) => ident.to_string(),
            (None, None) => i.to_string(),
        };
        fields.push(DescribedField { member, key });
    }

    let (serialize, deserialize) = match &s.fields {
        Fields::Named(_) => {
            let put = fields.iter().map(|DescribedField { member, key }| {
                quote!(::aspects::Describe::serialize(&self.#member, node.entry(#key));)
            });
            let take = fields.iter().map(|DescribedField { member, key }| {
                quote! {
                    if node.contains_key(#key) {
                        ::aspects::Describe::deserialize(&mut self.#member, node.get(#key), registry);
                    }
                }
            });
            (
                quote! {
                    node.make_map();
                    #(#put)*
                },
                quote! {
                    if !node.expect_map(stringify!(#ident)) {
                        return;
                    }
                    #(#take)*
                },
            )
        }
        Fields::Unnamed(_) => {
            let put = fields.iter().map(|DescribedField { member, .. }| {
                quote!(::aspects::Describe::serialize(&self.#member, node.push());)
            });
            let take = fields.iter().enumerate().map(|(i, DescribedField { member, .. })| {
                quote! {
                    if #i < node.len() {
                        ::aspects::Describe::deserialize(&mut self.#member, node.at(#i), registry);
                    }
                }
            });
            (
                quote! {
                    node.make_array().clear();
                    #(#put)*
                },
                quote! {
                    if !node.expect_array(stringify!(#ident)) {
                        return;
                    }
                    #(#take)*
                },
            )
        }
        Fields::Unit => (quote!(node.set_empty();), quote!(let _ = (node, registry);)),
    };

    Ok(quote! {
        impl #impl_generics ::aspects::Describe for #ident #type_generics #where_clause {
            fn type_name() -> ::std::borrow::Cow<'static, str> {
                #name
            }

            fn serialize(&self, mut node: ::aspects::NodeMut<'_>) {
                #serialize
            }

            fn deserialize(&mut self, node: ::aspects::NodeRef<'_>, registry: &::aspects::TypeRegistry) {
                #deserialize
            }
        }
    })
}

fn describe_enum(e: &ItemEnum) -> Result<TokenStream> {
    let ident = &e.ident;
    if !e.generics.params.is_empty() {
        return Err(Error::new(e.generics.span(), "generic enums are not supported"));
    }
    let mut variants = Vec::new();
    let mut keys = Vec::new();
    for variant in &e.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(Error::new(variant.span(), "only fieldless variants are supported"));
        }
        let attrs = field_attrs(&variant.attrs)?;
        variants.push(&variant.ident);
        keys.push(match attrs.rename {
            Some(rename) => rename.value(),
            None => variant.ident.to_string(),
        });
    }

    Ok(quote! {
        impl ::aspects::Describe for #ident {
            fn type_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(stringify!(#ident))
            }

            fn serialize(&self, mut node: ::aspects::NodeMut<'_>) {
                let name = match self {
                    #(Self::#variants => #keys,)*
                };
                node.set_str(name);
            }

            fn deserialize(&mut self, node: ::aspects::NodeRef<'_>, _: &::aspects::TypeRegistry) {
                match node.as_str() {
                    #(Some(#keys) => *self = Self::#variants,)*
                    Some(other) => ::aspects::__private::warn!(
                        "`{}` is not a {}",
                        other,
                        stringify!(#ident)
                    ),
                    None => ::aspects::__private::warn!(
                        "{} expects a string, found {:?} node",
                        stringify!(#ident),
                        node.kind()
                    ),
                }
            }
        }
    })
}

fn reflect_struct(s: &ItemStruct) -> Result<TokenStream> {
    let ident = &s.ident;
    if !s.generics.params.is_empty() {
        return Err(Error::new(s.generics.span(), "generic classes are not supported"));
    }
    let Fields::Named(named) = &s.fields else {
        return Err(Error::new(s.fields.span(), "classes need named fields"));
    };

    let attrs = container_attrs(&s.attrs)?;
    let mut statements = Vec::new();
    if let Some(name) = &attrs.name {
        statements.push(quote!(class.name(#name);));
    }
    if let Some(text) = doc(&s.attrs) {
        statements.push(quote!(class.description(#text);));
    }

    let mut extends = None;
    for field in &named.named {
        let field_ident = field.ident.as_ref().ok_or_else(|| Error::new(field.span(), "unnamed field"))?;
        let ty: &Type = &field.ty;
        let fattrs = field_attrs(&field.attrs)?;
        if fattrs.extends {
            if extends.replace(field_ident).is_some() {
                return Err(Error::new(field.span(), "a class extends at most one class"));
            }
            statements.push(quote! {
                class.extends::<#ty>(|this| &this.#field_ident, |this| &mut this.#field_ident);
            });
            continue;
        }
        if fattrs.skip {
            continue;
        }
        let key = match &fattrs.rename {
            Some(rename) => rename.value(),
            None => field_ident.to_string(),
        };
        statements.push(if fattrs.read_only {
            quote!(class.read_only::<#ty>(#key, |this| ::std::clone::Clone::clone(&this.#field_ident));)
        } else {
            quote!(class.field::<#ty>(#key, |this| &this.#field_ident, |this| &mut this.#field_ident);)
        });
        if let Some(text) = doc(&field.attrs) {
            statements.push(quote!(class.doc(#text);));
        }
    }

    for slot in &attrs.slots {
        statements.push(quote!(class.slot(stringify!(#slot), Self::#slot);));
    }
    if attrs.update {
        statements.push(quote!(class.wants_update();));
    }

    Ok(quote! {
        impl ::aspects::Reflect for #ident {
            fn build(class: &mut ::aspects::ClassBuilder<Self>) {
                #(#statements)*
            }
        }
    })
}
