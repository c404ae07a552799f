// trl: Legacy DNA sequencer trace ingestion, validation, and normalization.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! The field catalog: every manifest field name the loader recognizes,
//! with its validation and storage metadata.
//!
//! The catalog is built once by [FieldCatalog::standard], is immutable
//! afterwards, and is passed by reference into the manifest loader, rule
//! parser, and validator. Lookup is case-insensitive.

use indexmap::IndexMap;

/// Storage type of the target column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    Ascii,
    Uint,
    Float,
    Date,
}

/// Metadata for one recognized manifest field.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// Must appear in every manifest.
    pub mandatory: bool,
    /// May be declared once in the common block instead of per row.
    pub common: bool,
    /// Unknown to downstream consumers; dropped without complaint.
    pub can_ignore: bool,
    pub deprecated: bool,
    /// Value is a path that must exist and be non-empty on disk.
    pub file: bool,
    pub column_type: ColumnType,
    /// Target column width in bits.
    pub column_bits: u32,
    pub description: &'static str,
}

/// Flag characters for the catalog table: `m`andatory, `c`ommon-eligible,
/// `i`gnorable, `d`eprecated, `f`ile reference.
fn descriptor(
    name: &'static str,
    flags: &str,
    column_type: ColumnType,
    column_bits: u32,
    description: &'static str,
) -> FieldDescriptor {
    FieldDescriptor {
        name,
        mandatory: flags.contains('m'),
        common: flags.contains('c'),
        can_ignore: flags.contains('i'),
        deprecated: flags.contains('d'),
        file: flags.contains('f'),
        column_type,
        column_bits,
        description,
    }
}

pub struct FieldCatalog {
    fields: IndexMap<String, FieldDescriptor>,
}

impl FieldCatalog {
    /// The standard trace-submission vocabulary.
    pub fn standard() -> Self {
        use ColumnType::{Ascii, Date, Float, Uint};

        let table = [
            // Identity and container fields.
            descriptor("TRACE_NAME", "m", Ascii, 8, "unique name of the trace within the submission"),
            descriptor("TRACE_FILE", "mf", Ascii, 8, "path of the binary trace file"),
            descriptor("TRACE_FORMAT", "mc", Ascii, 8, "container format: ABI, SCF, ZTR or SFF"),
            descriptor("TRACE_TYPE_CODE", "mc", Ascii, 8, "sequencing strategy of the trace"),
            descriptor("SOURCE_TYPE", "mc", Ascii, 8, "source of the sequenced material"),
            descriptor("SPECIES_CODE", "mc", Ascii, 8, "species of the sequenced organism"),
            descriptor("CENTER_NAME", "mc", Ascii, 8, "submitting center"),
            descriptor("CENTER_PROJECT", "c", Ascii, 8, "center-internal project name"),
            descriptor("SUBMISSION_TYPE", "c", Ascii, 8, "new, update or withdrawal"),
            descriptor("ACCESSION", "i", Ascii, 8, "archive accession assigned on load"),
            descriptor("ANONYMIZED_ID", "", Ascii, 8, "anonymized individual identifier"),
            descriptor("NCBI_PROJECT_ID", "c", Uint, 32, "numeric archive project identifier"),
            descriptor("PROJECT_NAME", "c", Ascii, 8, "descriptive project name"),
            descriptor("PROGRAM_ID", "c", Ascii, 8, "basecaller program and version"),
            descriptor("STRATEGY", "c", Ascii, 8, "overall sequencing strategy"),
            descriptor("TAXID", "c", Uint, 32, "numeric species taxonomy identifier"),
            descriptor("ORGANISM_NAME", "c", Ascii, 8, "free-form organism name"),
            descriptor("DESCRIPTION", "", Ascii, 8, "free-form description of the trace"),
            // Override files supplied next to the trace.
            descriptor("BASE_FILE", "f", Ascii, 8, "external basecall file overriding the trace"),
            descriptor("QUAL_FILE", "f", Ascii, 8, "external quality file overriding the trace"),
            descriptor("PEAK_FILE", "f", Ascii, 8, "external peak-position file overriding the trace"),
            descriptor("FEATURE_ID_FILE", "f", Ascii, 8, "feature identifier file"),
            descriptor("FEATURE_SIGNAL_FILE", "f", Ascii, 8, "feature signal file"),
            descriptor("INFO_FILE", "fd", Ascii, 8, "auxiliary information file"),
            // Clips.
            descriptor("CLIP_QUALITY_LEFT", "", Uint, 32, "first base after the low-quality prefix"),
            descriptor("CLIP_QUALITY_RIGHT", "", Uint, 32, "last base before the low-quality suffix"),
            descriptor("CLIP_VECTOR_LEFT", "", Uint, 32, "first base after the vector prefix"),
            descriptor("CLIP_VECTOR_RIGHT", "", Uint, 32, "last base before the vector suffix"),
            // Library and template structure.
            descriptor("LIBRARY_ID", "c", Ascii, 8, "source library identifier"),
            descriptor("SEQ_LIB_ID", "c", Ascii, 8, "sequencing library identifier"),
            descriptor("TEMPLATE_ID", "", Ascii, 8, "sequenced template identifier"),
            descriptor("CLONE_ID", "", Ascii, 8, "clone the template derives from"),
            descriptor("CLONE_ID_LIST", "", Ascii, 8, "list of pooled clone identifiers"),
            descriptor("INSERT_SIZE", "c", Uint, 32, "expected insert length"),
            descriptor("INSERT_STDEV", "c", Uint, 32, "insert length standard deviation"),
            descriptor("INSERT_FLANK_LEFT", "", Ascii, 8, "left flanking sequence of the insert"),
            descriptor("INSERT_FLANK_RIGHT", "", Ascii, 8, "right flanking sequence of the insert"),
            descriptor("TRACE_DIRECTION", "", Ascii, 8, "forward or reverse read direction"),
            descriptor("TRACE_END", "", Ascii, 8, "which template end was read"),
            descriptor("PRIMER", "", Ascii, 8, "sequencing primer sequence"),
            descriptor("PRIMER_CODE", "", Ascii, 8, "sequencing primer category"),
            descriptor("PLATE_ID", "", Ascii, 8, "plate the reaction ran on"),
            descriptor("WELL_ID", "", Ascii, 8, "well within the plate"),
            // Amplification.
            descriptor("AMPLIFICATION_FORWARD", "", Ascii, 8, "forward amplification primer"),
            descriptor("AMPLIFICATION_REVERSE", "", Ascii, 8, "reverse amplification primer"),
            descriptor("AMPLIFICATION_SIZE", "", Uint, 32, "expected amplicon length"),
            // Vectors.
            descriptor("SVECTOR_CODE", "c", Ascii, 8, "sequencing vector code"),
            descriptor("SVECTOR_ACCESSION", "c", Ascii, 8, "sequencing vector accession"),
            descriptor("CVECTOR_CODE", "c", Ascii, 8, "cloning vector code"),
            descriptor("CVECTOR_ACCESSION", "c", Ascii, 8, "cloning vector accession"),
            descriptor("TRANSPOSON_CODE", "", Ascii, 8, "transposon code"),
            descriptor("TRANSPOSON_ACC", "", Ascii, 8, "transposon accession"),
            // Run metadata.
            descriptor("RUN_DATE", "c", Date, 64, "date of the sequencing run"),
            descriptor("RUN_LANE", "", Uint, 32, "lane or capillary of the run"),
            descriptor("RUN_GROUP_ID", "c", Ascii, 8, "grouping of runs that share conditions"),
            descriptor("RUN_MACHINE_ID", "c", Ascii, 8, "identifier of the sequencing machine"),
            descriptor("RUN_MACHINE_TYPE", "c", Ascii, 8, "model of the sequencing machine"),
            descriptor("CHEMISTRY", "c", Ascii, 8, "sequencing chemistry"),
            descriptor("CHEMISTRY_TYPE", "c", Ascii, 8, "sequencing chemistry category"),
            descriptor("ITERATION", "", Uint, 32, "attempt number for this template"),
            descriptor("ATTEMPT", "d", Uint, 32, "superseded by ITERATION"),
            descriptor("PREP_GROUP_ID", "", Ascii, 8, "template preparation group"),
            descriptor("PICK_GROUP_ID", "", Ascii, 8, "colony picking group"),
            descriptor("DEPTH", "", Float, 64, "sampling depth in meters"),
            descriptor("ELEVATION", "", Float, 64, "sampling elevation in meters"),
            descriptor("LATITUDE", "", Float, 64, "sampling latitude"),
            descriptor("LONGITUDE", "", Float, 64, "sampling longitude"),
            descriptor("COLLECTION_DATE", "", Date, 64, "date the sample was collected"),
            descriptor("ENVIRONMENT_TYPE", "c", Ascii, 8, "environment the sample derives from"),
            descriptor("HOST_CONDITION", "", Ascii, 8, "condition of the sampled host"),
            descriptor("HOST_ID", "", Ascii, 8, "identifier of the sampled host"),
            descriptor("HOST_LOCATION", "", Ascii, 8, "geographic location of the host"),
            descriptor("HOST_SPECIES", "", Ascii, 8, "species of the sampled host"),
            descriptor("INDIVIDUAL_ID", "", Ascii, 8, "individual within the population"),
            descriptor("POPULATION_ID", "", Ascii, 8, "population the individual belongs to"),
            descriptor("PLACE_NAME", "", Ascii, 8, "named sampling location"),
            descriptor("COUNTRY", "", Ascii, 8, "sampling country"),
            descriptor("STATE", "", Ascii, 8, "sampling state or province"),
            descriptor("PH", "", Float, 64, "sample pH"),
            descriptor("SALINITY", "", Float, 64, "sample salinity"),
            descriptor("TEMPERATURE", "", Float, 64, "sample temperature"),
            descriptor("WATER_DEPTH", "d", Float, 64, "superseded by DEPTH"),
            descriptor("STRAIN", "c", Ascii, 8, "organism strain"),
            descriptor("CULTIVAR", "", Ascii, 8, "plant cultivar"),
            descriptor("BREED", "", Ascii, 8, "animal breed"),
            descriptor("SEX", "", Ascii, 8, "sex of the sampled individual"),
            descriptor("AGE", "", Ascii, 8, "age of the sampled individual"),
            descriptor("TISSUE_TYPE", "", Ascii, 8, "sampled tissue"),
            descriptor("CELL_LINE", "", Ascii, 8, "cultured cell line"),
            descriptor("CELL_TYPE", "", Ascii, 8, "sampled cell type"),
            descriptor("DEVELOPMENT_STAGE", "", Ascii, 8, "developmental stage of the sample"),
            descriptor("DISEASE_STATE", "", Ascii, 8, "disease state of the sample"),
            descriptor("GENOTYPE", "", Ascii, 8, "genotype of the sample"),
            descriptor("LAB_HOST", "", Ascii, 8, "laboratory host the clone was grown in"),
            descriptor("SAMPLE_ID", "", Ascii, 8, "submitter-assigned sample identifier"),
            descriptor("GENE_NAME", "", Ascii, 8, "targeted gene"),
            descriptor("CHROMOSOME", "", Ascii, 8, "targeted chromosome"),
            descriptor("PMID", "", Uint, 32, "publication describing the data"),
            // Reference-assisted submissions.
            descriptor("REFERENCE_ACCESSION", "", Ascii, 8, "reference sequence accession"),
            descriptor("REFERENCE_ACC_MAX", "", Uint, 32, "largest reference coordinate covered"),
            descriptor("REFERENCE_ACC_MIN", "", Uint, 32, "smallest reference coordinate covered"),
            descriptor("REFERENCE_OFFSET", "", Uint, 32, "offset of the trace on the reference"),
            descriptor("REFERENCE_SET_MAX", "", Uint, 32, "largest coordinate in the reference set"),
            descriptor("REFERENCE_SET_MIN", "", Uint, 32, "smallest coordinate in the reference set"),
            // Pooled and array-based experiments.
            descriptor("CHIP_DESIGN_ID", "", Ascii, 8, "array chip design identifier"),
            descriptor("HI_FILTER_SIZE", "", Uint, 32, "upper size-selection bound"),
            descriptor("LO_FILTER_SIZE", "", Uint, 32, "lower size-selection bound"),
            descriptor("POOL_ID", "", Ascii, 8, "pooled sample identifier"),
            descriptor("EXTENDED_DATA", "i", Ascii, 8, "submitter-defined extension block"),
            descriptor("COMPRESS_TYPE", "id", Ascii, 8, "obsolete per-file compression note"),
        ];

        let mut fields: IndexMap<String, FieldDescriptor> = IndexMap::with_capacity(table.len());
        for entry in table {
            fields.insert(entry.name.to_string(), entry);
        }
        FieldCatalog { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(&name.to_ascii_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|descriptor| descriptor.mandatory)
    }

    /// Fields whose values are paths subject to existence checks.
    pub fn file_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|descriptor| descriptor.file)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
