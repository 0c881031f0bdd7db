//! Decoding of complete class files.

use crate::{
    classfile::{
        access::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        annotations::{merge_parameter_annotations, read_annotations, read_parameter_annotations},
        attributes::{names, read_exceptions, Code, RawAttribute},
        constpool::ConstantPool,
        ClassFile, FieldInfo, MethodInfo, ReadOptions, MAGIC, MAX_MAJOR_VERSION,
        MIN_MAJOR_VERSION,
    },
    file::parser::Parser,
    Result,
};

/// Annotation attributes collected while walking a member's attribute table.
#[derive(Default)]
struct MemberAttributes {
    annotations: Vec<crate::classfile::Annotation>,
    visible_parameters: Vec<Vec<crate::classfile::Annotation>>,
    invisible_parameters: Vec<Vec<crate::classfile::Annotation>>,
    exceptions: Vec<String>,
    code: Option<Code>,
    source_file: Option<String>,
    others: Vec<RawAttribute>,
}

fn read_member_attributes(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    options: ReadOptions,
) -> Result<MemberAttributes> {
    let mut collected = MemberAttributes::default();

    let count = parser.read_be::<u16>()?;
    for _ in 0..count {
        let name = pool.utf8(parser.read_be::<u16>()?)?;
        let length = parser.read_be::<u32>()?;
        let mut body = parser.sub_parser(length as usize)?;

        match name {
            names::RUNTIME_VISIBLE_ANNOTATIONS
            | names::RUNTIME_INVISIBLE_ANNOTATIONS
            | names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            | names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
                if options.skip_annotations =>
            {
                collected.others.push(RawAttribute {
                    name: name.to_string(),
                    data: body.data().to_vec(),
                });
                continue;
            }
            names::RUNTIME_VISIBLE_ANNOTATIONS => collected
                .annotations
                .extend(read_annotations(&mut body, pool, true)?),
            names::RUNTIME_INVISIBLE_ANNOTATIONS => collected
                .annotations
                .extend(read_annotations(&mut body, pool, false)?),
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
                collected.visible_parameters = read_parameter_annotations(&mut body, pool, true)?;
            }
            names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                collected.invisible_parameters =
                    read_parameter_annotations(&mut body, pool, false)?;
            }
            names::EXCEPTIONS => collected.exceptions = read_exceptions(&mut body, pool)?,
            names::SOURCE_FILE => {
                collected.source_file = Some(pool.utf8(body.read_be::<u16>()?)?.to_string());
            }
            names::CODE => {
                if !options.skip_code {
                    collected.code = Some(Code::read(&mut body, pool)?);
                }
                continue;
            }
            _ => {
                collected.others.push(RawAttribute {
                    name: name.to_string(),
                    data: body.data().to_vec(),
                });
                continue;
            }
        }

        if body.has_more_data() {
            return Err(malformed_error!(
                "Attribute {} has {} trailing bytes",
                name,
                body.remaining()
            ));
        }
    }

    Ok(collected)
}

pub(crate) fn read_class(data: &[u8], options: ReadOptions) -> Result<ClassFile> {
    let mut parser = Parser::new(data);

    let magic = parser.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(malformed_error!("Invalid class file magic 0x{:08x}", magic));
    }

    let minor_version = parser.read_be::<u16>()?;
    let major_version = parser.read_be::<u16>()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        return Err(crate::Error::NotSupported(format!(
            "class file version {major_version}.{minor_version}"
        )));
    }

    let constant_pool = ConstantPool::read(&mut parser)?;

    let access_flags = ClassAccessFlags::from_bits_retain(parser.read_be::<u16>()?);
    let this_class = constant_pool.class_name(parser.read_be::<u16>()?)?.to_string();
    let super_class = match parser.read_be::<u16>()? {
        0 => None,
        index => Some(constant_pool.class_name(index)?.to_string()),
    };

    let interface_count = parser.read_be::<u16>()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(constant_pool.class_name(parser.read_be::<u16>()?)?.to_string());
    }

    let field_count = parser.read_be::<u16>()?;
    let mut fields = Vec::with_capacity(field_count.min(1024) as usize);
    for _ in 0..field_count {
        let access_flags = FieldAccessFlags::from_bits_retain(parser.read_be::<u16>()?);
        let name = constant_pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let descriptor = constant_pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let attributes = read_member_attributes(&mut parser, &constant_pool, options)?;
        fields.push(FieldInfo {
            access_flags,
            name,
            descriptor,
            annotations: attributes.annotations,
            attributes: attributes.others,
        });
    }

    let method_count = parser.read_be::<u16>()?;
    let mut methods = Vec::with_capacity(method_count.min(1024) as usize);
    for _ in 0..method_count {
        let access_flags = MethodAccessFlags::from_bits_retain(parser.read_be::<u16>()?);
        let name = constant_pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let descriptor = constant_pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let attributes = read_member_attributes(&mut parser, &constant_pool, options)?;
        methods.push(MethodInfo {
            access_flags,
            name,
            descriptor,
            exceptions: attributes.exceptions,
            annotations: attributes.annotations,
            parameter_annotations: merge_parameter_annotations(
                attributes.visible_parameters,
                attributes.invisible_parameters,
            ),
            code: attributes.code,
            attributes: attributes.others,
        });
    }

    let class_attributes = read_member_attributes(&mut parser, &constant_pool, options)?;

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after class file of {}",
            parser.remaining(),
            this_class
        ));
    }

    Ok(ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        annotations: class_attributes.annotations,
        source_file: class_attributes.source_file,
        attributes: class_attributes.others,
    })
}
