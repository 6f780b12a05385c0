use crate::{
    config::SourceConfig,
    database::{FieldRecord, FieldValue, FrameData, InstanceData},
    datatypes::{Quantity, ResultSet, Tensor6},
    error::ZoiError,
    observer::ExtractionObserver,
};

/// Records written and records discarded by one attach pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachCount {
    pub attached: usize,
    pub dropped: usize,
}

fn finite(quantity: Quantity, record: &FieldRecord, values: &[f64]) -> Result<(), ZoiError> {
    if values.iter().all(|v| v.is_finite()) {
        return Ok(());
    }
    Err(ZoiError::Extraction(format!(
        "{quantity} value for label {} is not finite",
        record.label
    )))
}

fn scalar(quantity: Quantity, record: &FieldRecord) -> Result<f64, ZoiError> {
    let value = match &record.data {
        FieldValue::Scalar(v) => *v,
        FieldValue::Vector(v) if v.len() == 1 => v[0],
        FieldValue::Vector(v) => {
            return Err(ZoiError::Extraction(format!(
                "{quantity} value for label {} has {} components, expected a scalar",
                record.label,
                v.len()
            )))
        }
    };
    finite(quantity, record, &[value])?;
    Ok(value)
}

fn tensor(quantity: Quantity, record: &FieldRecord) -> Result<Tensor6, ZoiError> {
    let value = match &record.data {
        FieldValue::Vector(v) if v.len() == 6 => [v[0], v[1], v[2], v[3], v[4], v[5]],
        FieldValue::Vector(v) => {
            return Err(ZoiError::Extraction(format!(
                "{quantity} value for label {} has {} components, expected 6",
                record.label,
                v.len()
            )))
        }
        FieldValue::Scalar(_) => {
            return Err(ZoiError::Extraction(format!(
                "{quantity} value for label {} is a scalar, expected 6 components",
                record.label
            )))
        }
    };
    finite(quantity, record, &value)?;
    Ok(value)
}

/// Writes one record into its target entity, if that entity was kept by
/// the geometry filter
///
/// # Returns
/// Whether the record was attached
fn write_record(quantity: Quantity, record: &FieldRecord, target: &mut ResultSet) -> Result<bool, ZoiError> {
    if quantity.is_nodal() {
        let node = match target.node_mut(record.label) {
            Some(n) => n,
            None => return Ok(false),
        };
        node.temperature = Some(scalar(quantity, record)?);
        return Ok(true);
    }

    let element = match target.element_mut(record.label) {
        Some(e) => e,
        None => return Ok(false),
    };
    match quantity {
        Quantity::EquivalentPlasticStrain => element.peeq = Some(scalar(quantity, record)?),
        Quantity::PlasticStrain => element.plastic_strain = Some(tensor(quantity, record)?),
        Quantity::Stress => element.stress = Some(tensor(quantity, record)?),
        Quantity::Temperature => unreachable!("nodal quantity handled above"),
    }
    Ok(true)
}

/// Attaches the records of one field to the filtered entities.
///
/// Records whose label is not in `target`, or that `accept` rejects, are
/// dropped. Entities are never created here. Later records for the same
/// label overwrite earlier ones.
///
/// # Arguments
/// * `records` - The field records to walk
/// * `quantity` - Which attribute the records fill
/// * `target` - The filtered nodes and elements of the source
/// * `accept` - Extra per-record restriction
/// * `observer` - Receives per-record progress
pub fn attach<'r, I, A>(
    records: I,
    quantity: Quantity,
    target: &mut ResultSet,
    accept: A,
    observer: &mut dyn ExtractionObserver,
) -> Result<AttachCount, ZoiError>
where
    I: IntoIterator<Item = &'r FieldRecord>,
    A: Fn(&FieldRecord) -> bool,
{
    let mut count = AttachCount::default();

    for record in records {
        observer.record_walked();
        if accept(record) && write_record(quantity, record, target)? {
            count.attached += 1;
        } else {
            count.dropped += 1;
        }
    }

    Ok(count)
}

/// Attaches all four quantities of a frame in extraction order
///
/// Element quantities match by label alone. Temperature is restricted to
/// the configured node set and to records of the configured instance,
/// since nodal labels repeat across instances.
pub fn aggregate_fields(
    source: &SourceConfig,
    frame: &FrameData,
    instance: &InstanceData,
    target: &mut ResultSet,
    observer: &mut dyn ExtractionObserver,
) -> Result<(), ZoiError> {
    for quantity in Quantity::ALL {
        let field = frame.field(source.field_keys.key(quantity))?;

        let count = if quantity.is_nodal() {
            let region = instance.region(&source.node_set_name)?;
            let records: Vec<&FieldRecord> = field.subset(&region).collect();
            observer.field_started(quantity, records.len());
            attach(
                records,
                quantity,
                target,
                |record| record.instance.as_deref() == Some(source.instance_name.as_str()),
                observer,
            )?
        } else {
            observer.field_started(quantity, field.values.len());
            attach(&field.values, quantity, target, |_| true, observer)?
        };

        observer.field_attached(&source.name, quantity, count.attached, count.dropped);
    }

    Ok(())
}
