//! Derive macro for `qs_marshal::Reflect`.
//!
//! ```ignore
//! #[derive(Reflect)]
//! struct Search {
//!     #[qs("q,req")]
//!     query: String,
//!     #[qs(embed)]
//!     paging: Paging,
//! }
//! ```
//!
//! Container attributes:
//!
//! - `#[qs(opaque)]`: the type has no inner structure and needs a converter
//!   registered with the factories.
//! - `#[qs(custom)]`: opaque, converting itself through `MarshalQs` and
//!   `UnmarshalQs`. `#[qs(marshal_qs)]` and `#[qs(unmarshal_qs)]` select a
//!   single direction.
//! - `#[qs(transparent)]`: a struct with a single field that reflects as that
//!   field.
//!
//! Field attributes:
//!
//! - `#[qs("name,options")]`: the raw field tag.
//! - `#[qs(embed)]`: merge the keys of the field into the parent record.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericParam, Ident, LitStr, Member, Token, Type,
    parse_macro_input, parse_quote,
};

#[proc_macro_derive(Reflect, attributes(qs))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

enum QsArg {
    Tag(LitStr),
    Flag(Ident),
}

impl Parse for QsArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            input.parse().map(QsArg::Tag)
        } else {
            input.parse().map(QsArg::Flag)
        }
    }
}

fn qs_args(attrs: &[Attribute]) -> syn::Result<Vec<QsArg>> {
    let mut args = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("qs")) {
        args.extend(attr.parse_args_with(Punctuated::<QsArg, Token![,]>::parse_terminated)?);
    }
    Ok(args)
}

#[derive(Default)]
struct ContainerAttrs {
    opaque: bool,
    transparent: bool,
    marshal_qs: bool,
    unmarshal_qs: bool,
}

impl ContainerAttrs {
    fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = ContainerAttrs::default();
        for arg in qs_args(attrs)? {
            match arg {
                QsArg::Flag(flag) if flag == "opaque" => out.opaque = true,
                QsArg::Flag(flag) if flag == "transparent" => out.transparent = true,
                QsArg::Flag(flag) if flag == "custom" => {
                    out.marshal_qs = true;
                    out.unmarshal_qs = true;
                }
                QsArg::Flag(flag) if flag == "marshal_qs" => out.marshal_qs = true,
                QsArg::Flag(flag) if flag == "unmarshal_qs" => out.unmarshal_qs = true,
                QsArg::Flag(flag) => {
                    return Err(syn::Error::new(flag.span(), "unknown container attribute"));
                }
                QsArg::Tag(lit) => {
                    return Err(syn::Error::new(
                        lit.span(),
                        "tags are only allowed on fields",
                    ));
                }
            }
        }
        if out.transparent && (out.opaque || out.marshal_qs || out.unmarshal_qs) {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                "`transparent` can't be combined with other container attributes",
            ));
        }
        Ok(out)
    }

    fn is_opaque(&self) -> bool {
        self.opaque || self.marshal_qs || self.unmarshal_qs
    }
}

struct RecordField {
    member: Member,
    name: String,
    ty: Type,
    tag: Option<LitStr>,
    embed: bool,
}

impl RecordField {
    fn from_field(index: usize, field: &syn::Field) -> syn::Result<Self> {
        let (member, name) = match &field.ident {
            Some(ident) => (Member::Named(ident.clone()), ident.unraw().to_string()),
            None => (Member::Unnamed(index.into()), index.to_string()),
        };
        let mut out = RecordField {
            member,
            name,
            ty: field.ty.clone(),
            tag: None,
            embed: false,
        };
        for arg in qs_args(&field.attrs)? {
            match arg {
                QsArg::Tag(lit) if out.tag.is_none() => out.tag = Some(lit),
                QsArg::Tag(lit) => {
                    return Err(syn::Error::new(lit.span(), "duplicate field tag"));
                }
                QsArg::Flag(flag) if flag == "embed" => out.embed = true,
                QsArg::Flag(flag) => {
                    return Err(syn::Error::new(flag.span(), "unknown field attribute"));
                }
            }
        }
        Ok(out)
    }

    /// Whether the tag names the field `-`. Such fields are left out of the
    /// record entirely, so their type doesn't need to be reflected.
    fn is_skipped(&self) -> bool {
        self.tag
            .as_ref()
            .is_some_and(|tag| tag.value().split(',').next() == Some("-"))
    }
}

fn expand(mut input: DeriveInput) -> syn::Result<TokenStream2> {
    let attrs = ContainerAttrs::from_attrs(&input.attrs)?;

    for param in input.generics.params.iter_mut() {
        match param {
            GenericParam::Type(ty) => ty.bounds.push(parse_quote!(::qs_marshal::Reflect)),
            GenericParam::Lifetime(lt) => {
                return Err(syn::Error::new(
                    lt.span(),
                    "reflected types can't borrow, lifetimes are not supported",
                ));
            }
            GenericParam::Const(_) => {}
        }
    }

    if attrs.is_opaque() {
        return Ok(expand_opaque(&input, &attrs));
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.ident.span(),
            "only structs can derive `Reflect`, use `#[qs(opaque)]` or `#[qs(custom)]` for other types",
        ));
    };

    let fields = data
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| RecordField::from_field(i, f))
        .collect::<syn::Result<Vec<_>>>()?;

    if attrs.transparent {
        let [field] = fields.as_slice() else {
            return Err(syn::Error::new(
                input.ident.span(),
                "`transparent` requires exactly one field",
            ));
        };
        return Ok(expand_transparent(&input, field));
    }

    if matches!(data.fields, Fields::Unnamed(_)) {
        return Err(syn::Error::new(
            input.ident.span(),
            "tuple structs need `#[qs(transparent)]`, `#[qs(opaque)]` or `#[qs(custom)]`",
        ));
    }

    Ok(expand_record(&input, &fields))
}

fn reflect_impl(input: &DeriveInput, body: TokenStream2) -> TokenStream2 {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    quote! {
        impl #impl_generics ::qs_marshal::Reflect for #name #ty_generics #where_clause {
            #body

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    }
}

fn expand_opaque(input: &DeriveInput, attrs: &ContainerAttrs) -> TokenStream2 {
    let marshal_qs = attrs
        .marshal_qs
        .then(|| quote!(.with_marshal_qs::<Self>()));
    let unmarshal_qs = attrs
        .unmarshal_qs
        .then(|| quote!(.with_unmarshal_qs::<Self>()));
    reflect_impl(
        input,
        quote! {
            fn type_info() -> ::qs_marshal::TypeInfo {
                ::qs_marshal::TypeInfo::opaque::<Self>() #marshal_qs #unmarshal_qs
            }

            fn reflect_ref(&self) -> ::qs_marshal::ReflectRef<'_> {
                ::qs_marshal::ReflectRef::Opaque
            }

            fn reflect_mut(&mut self) -> ::qs_marshal::ReflectMut<'_> {
                ::qs_marshal::ReflectMut::Opaque
            }
        },
    )
}

fn expand_transparent(input: &DeriveInput, field: &RecordField) -> TokenStream2 {
    let RecordField { member, ty, .. } = field;
    reflect_impl(
        input,
        quote! {
            fn type_info() -> ::qs_marshal::TypeInfo {
                ::qs_marshal::TypeInfo::transparent::<Self, #ty>()
            }

            fn reflect_ref(&self) -> ::qs_marshal::ReflectRef<'_> {
                ::qs_marshal::Reflect::reflect_ref(&self.#member)
            }

            fn reflect_mut(&mut self) -> ::qs_marshal::ReflectMut<'_> {
                ::qs_marshal::Reflect::reflect_mut(&mut self.#member)
            }
        },
    )
}

fn expand_record(input: &DeriveInput, fields: &[RecordField]) -> TokenStream2 {
    let fields: Vec<(usize, &RecordField)> = fields
        .iter()
        .filter(|field| !field.is_skipped())
        .enumerate()
        .collect();
    let field_infos = fields.iter().map(|(index, field)| {
        let RecordField {
            name, ty, tag, embed, ..
        } = field;
        let tag = tag.as_ref().map(|tag| quote!(.with_tag(#tag)));
        let embed = embed.then(|| quote!(.embedded()));
        quote!(::qs_marshal::FieldInfo::new::<#ty>(#name, #index) #tag #embed)
    });
    let indexes: Vec<usize> = fields.iter().map(|(index, _)| *index).collect();
    let members: Vec<&Member> = fields.iter().map(|(_, field)| &field.member).collect();

    let reflect = reflect_impl(
        input,
        quote! {
            fn type_info() -> ::qs_marshal::TypeInfo {
                ::qs_marshal::TypeInfo::record::<Self>(|| ::std::vec![#(#field_infos),*])
            }

            fn reflect_ref(&self) -> ::qs_marshal::ReflectRef<'_> {
                ::qs_marshal::ReflectRef::Record(self)
            }

            fn reflect_mut(&mut self) -> ::qs_marshal::ReflectMut<'_> {
                ::qs_marshal::ReflectMut::Record(self)
            }
        },
    );

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    quote! {
        #reflect

        impl #impl_generics ::qs_marshal::Record for #name #ty_generics #where_clause {
            fn field(&self, index: usize) -> ::std::option::Option<&dyn ::qs_marshal::Reflect> {
                match index {
                    #(#indexes => ::std::option::Option::Some(
                        &self.#members as &dyn ::qs_marshal::Reflect
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn field_mut(
                &mut self,
                index: usize,
            ) -> ::std::option::Option<&mut dyn ::qs_marshal::Reflect> {
                match index {
                    #(#indexes => ::std::option::Option::Some(
                        &mut self.#members as &mut dyn ::qs_marshal::Reflect
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    }
}
