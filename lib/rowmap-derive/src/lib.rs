use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, PathArguments, Type,
    parse_macro_input,
};

/// Convert CamelCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);

    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Read `= "name"` or `= name` after an attribute key.
fn parse_name(meta: &ParseNestedMeta) -> syn::Result<String> {
    let value = meta.value()?;
    if value.peek(LitStr) {
        Ok(value.parse::<LitStr>()?.value())
    } else {
        Ok(value.parse::<Ident>()?.to_string())
    }
}

/// Parse #[record(table = "...", alias = "...")]
fn parse_record_attr(input: &DeriveInput) -> syn::Result<(Option<String>, Option<String>)> {
    let mut table = None;
    let mut alias = None;

    for attr in &input.attrs {
        if attr.path().is_ident("record") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table = Some(parse_name(&meta)?);
                } else if meta.path.is_ident("alias") {
                    alias = Some(parse_name(&meta)?);
                } else {
                    return Err(meta.error("expected `table` or `alias`"));
                }
                Ok(())
            })?;
        }
    }

    Ok((table, alias))
}

#[derive(Default)]
struct ColumnAttr {
    primary_key: bool,
    skip: bool,
    name: Option<String>,
}

/// Parse #[column(primary_key | skip | name = "...")]
fn parse_column_attr(field: &syn::Field) -> syn::Result<ColumnAttr> {
    let mut column = ColumnAttr::default();

    for attr in &field.attrs {
        if attr.path().is_ident("column") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary_key") {
                    column.primary_key = true;
                } else if meta.path.is_ident("skip") {
                    column.skip = true;
                } else if meta.path.is_ident("name") {
                    column.name = Some(parse_name(&meta)?);
                } else {
                    return Err(meta.error("expected `primary_key`, `skip` or `name`"));
                }
                Ok(())
            })?;
        }
    }

    Ok(column)
}

/// Parse #[belongs_to(key = ..., references = ...)]
fn parse_belongs_to_attr(field: &syn::Field) -> syn::Result<Option<(String, String)>> {
    let Some(attr) = field
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("belongs_to"))
    else {
        return Ok(None);
    };

    let mut key = None;
    let mut references = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("key") {
            key = Some(parse_name(&meta)?);
        } else if meta.path.is_ident("references") {
            references = Some(parse_name(&meta)?);
        } else {
            return Err(meta.error("expected `key` or `references`"));
        }
        Ok(())
    })?;

    match (key, references) {
        (Some(key), Some(references)) => Ok(Some((key, references))),
        _ => Err(syn::Error::new_spanned(
            attr,
            "belongs_to requires both `key` and `references`",
        )),
    }
}

/// The `P` of an `Option<P>` field type.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Derive macro for the Record trait
///
/// Generates the registration call (`describe`) and the column accessors
/// (`get`, `set`, `set_related`) from field attributes. Validation of the
/// declared metadata is left to the registry.
///
/// ## Attributes
///
/// - `#[record(table = "...", alias = "...")]` on the struct. The table
///   defaults to the snake_case type name plus `s`, the alias to the
///   snake_case type name.
/// - `#[column(primary_key)]`, `#[column(name = "...")]`, `#[column(skip)]`
///   on fields. Every other field is a column named after the field.
/// - `#[belongs_to(key = local_column, references = parent_column)]` on an
///   `Option<Parent>` field. The field name is the relation name; the field
///   is not a column.
///
/// ## Example
///
/// ```text
/// #[derive(Debug, Clone, Default, Record)]
/// #[record(table = "books", alias = "book")]
/// struct Book {
///     #[column(primary_key)]
///     pub id: i64,
///     pub title: String,
///     pub author_id: i64,
///     #[belongs_to(key = author_id, references = id)]
///     pub author: Option<Author>,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record, column, belongs_to))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Record only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(input, "Record only supports structs")),
    };

    let snake = to_snake_case(&name.to_string());
    let (table, alias) = parse_record_attr(input)?;
    let table = table.unwrap_or_else(|| format!("{}s", snake));
    let alias = alias.unwrap_or(snake);

    let mut declarations = Vec::new();
    let mut relations = Vec::new();
    let mut getters = Vec::new();
    let mut setters = Vec::new();
    let mut related_setters = Vec::new();

    for field in fields.iter() {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let field_ty = &field.ty;

        if let Some((key, references)) = parse_belongs_to_attr(field)? {
            let parent_ty = option_inner(field_ty).ok_or_else(|| {
                syn::Error::new_spanned(field_ty, "belongs_to fields must be Option<Parent>")
            })?;
            let relation = field_name.to_string();

            relations.push(quote! {
                .belongs_to::<#parent_ty>(#relation, #key, #references)
            });
            related_setters.push(quote! {
                #relation => {
                    let parent = related.downcast::<#parent_ty>().map_err(|_| {
                        ::rowmap::StorageError::Relation(format!(
                            "relation {} of {} expects {}",
                            #relation,
                            stringify!(#name),
                            stringify!(#parent_ty)
                        ))
                    })?;
                    self.#field_name = ::std::option::Option::Some(*parent);
                    Ok(())
                }
            });
            continue;
        }

        let column = parse_column_attr(field)?;
        if column.skip {
            continue;
        }
        let column_name = column.name.unwrap_or_else(|| field_name.to_string());

        declarations.push(if column.primary_key {
            quote! { .primary_key(#column_name) }
        } else {
            quote! { .column(#column_name) }
        });
        getters.push(quote! {
            #column_name => ::std::option::Option::Some(::rowmap::Value::from(self.#field_name.clone())),
        });
        setters.push(quote! {
            #column_name => {
                self.#field_name = <#field_ty as ::rowmap::FromValue>::from_value(value).map_err(|e| {
                    ::rowmap::StorageError::Mapping(format!("{}.{}: {}", stringify!(#name), #column_name, e))
                })?;
                Ok(())
            }
        });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::rowmap::Record for #name #ty_generics #where_clause {
            fn describe(builder: ::rowmap::DescriptorBuilder) -> ::rowmap::DescriptorBuilder {
                builder
                    .table(#table)
                    .alias(#alias)
                    #(#declarations)*
                    #(#relations)*
            }

            fn get(&self, column: &str) -> ::std::option::Option<::rowmap::Value> {
                match column {
                    #(#getters)*
                    _ => ::std::option::Option::None,
                }
            }

            fn set(
                &mut self,
                column: &str,
                value: ::rowmap::Value,
            ) -> ::std::result::Result<(), ::rowmap::StorageError> {
                match column {
                    #(#setters)*
                    _ => Err(::rowmap::StorageError::Mapping(format!(
                        "{} has no column {}",
                        stringify!(#name),
                        column
                    ))),
                }
            }

            fn set_related(
                &mut self,
                relation: &str,
                related: ::std::boxed::Box<dyn ::std::any::Any + Send>,
            ) -> ::std::result::Result<(), ::rowmap::StorageError> {
                match relation {
                    #(#related_setters)*
                    _ => {
                        drop(related);
                        Err(::rowmap::StorageError::Relation(format!(
                            "{} declares no relation {}",
                            stringify!(#name),
                            relation
                        )))
                    }
                }
            }
        }
    })
}
