//! Header-keyed CSV parsing for the crime and profile tables.
//!
//! Every row is read into a map keyed by the column headers, then typed
//! values are pulled out column by column so that each failure can name
//! the offending column and neighbourhood.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use crime_trends_crime_models::{CrimeType, study_years};
use crime_trends_neighborhood_models::{
    CrimeHistory, CrimeObservation, NEIGHBOURHOOD_COLUMN, ProfileCounts, SocioeconomicProfile,
};

use crate::NeighborhoodError;

/// Raw census count columns required in the profile table.
pub const PROFILE_COLUMNS: &[&str] = &[
    "total_households",
    "one_parent_families",
    "two_parent_families",
    "median_income",
    "unemployment_rate",
    "total_education",
    "bachelors_or_higher",
];

/// A parsed CSV table with its header set.
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Which input table this is (used in error messages).
    pub table: &'static str,
    headers: BTreeSet<String>,
    rows: Vec<RawRow>,
}

/// A single CSV row keyed by column header.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// Value of the `neighbourhood` column.
    pub neighbourhood: String,
    fields: BTreeMap<String, String>,
}

impl RawTable {
    /// Reads a CSV table whose first row holds the column headers.
    ///
    /// Whitespace around headers and values is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborhoodError::Csv`] if the CSV is malformed,
    /// [`NeighborhoodError::MissingColumn`] if there is no `neighbourhood`
    /// column, [`NeighborhoodError::InvalidValue`] if a header is repeated,
    /// or [`NeighborhoodError::MissingValue`] if a row has an empty
    /// neighbourhood name.
    pub fn read<R: Read>(reader: R, table: &'static str) -> Result<Self, NeighborhoodError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        let mut seen = BTreeSet::new();
        if let Some(repeated) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(NeighborhoodError::InvalidValue {
                column: repeated.clone(),
                neighbourhood: format!("<{table} header>"),
                value: repeated.clone(),
                reason: "column appears more than once in the header".to_string(),
            });
        }
        if !headers.iter().any(|h| h == NEIGHBOURHOOD_COLUMN) {
            return Err(NeighborhoodError::MissingColumn {
                table,
                column: NEIGHBOURHOOD_COLUMN.to_string(),
            });
        }

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            let fields: BTreeMap<String, String> = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_owned))
                .collect();

            let neighbourhood = fields
                .get(NEIGHBOURHOOD_COLUMN)
                .filter(|name| !name.is_empty())
                .cloned()
                .ok_or_else(|| NeighborhoodError::MissingValue {
                    column: NEIGHBOURHOOD_COLUMN.to_string(),
                    neighbourhood: format!("<{table} row {}>", idx + 1),
                })?;

            rows.push(RawRow {
                neighbourhood,
                fields,
            });
        }

        log::debug!("Read {} row(s) from {table} table", rows.len());

        Ok(Self {
            table,
            headers: headers.into_iter().collect(),
            rows,
        })
    }

    /// Whether the table has a column with this name.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.contains(column)
    }

    /// Fails unless every listed column is present.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborhoodError::MissingColumn`] for the first absent
    /// column.
    pub fn require_columns<'a>(
        &self,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), NeighborhoodError> {
        for column in columns {
            if !self.has_column(column) {
                return Err(NeighborhoodError::MissingColumn {
                    table: self.table,
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Rows in file order.
    #[must_use]
    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    /// Parses every row's census profile.
    ///
    /// # Errors
    ///
    /// Returns an error if a profile column is missing or any row fails to
    /// parse.
    pub fn profiles(&self) -> Result<Vec<(String, SocioeconomicProfile)>, NeighborhoodError> {
        self.require_columns(PROFILE_COLUMNS.iter().copied())?;
        self.rows
            .iter()
            .map(|row| Ok((row.neighbourhood.clone(), row.profile()?)))
            .collect()
    }

    /// Parses every row's crime history.
    ///
    /// Rate columns are required for every analysed crime type in every
    /// study year. Count columns, and any column for a crime type that is
    /// not analysed, are read when present.
    ///
    /// # Errors
    ///
    /// Returns an error if a required rate column is missing or any row
    /// fails to parse.
    pub fn crime_histories(&self) -> Result<Vec<(String, CrimeHistory)>, NeighborhoodError> {
        let years = study_years();
        let required: Vec<String> = CrimeType::analyzed()
            .iter()
            .flat_map(|crime| years.iter().map(|&year| crime.rate_column(year)))
            .collect();
        self.require_columns(required.iter().map(String::as_str))?;

        let mut columns = Vec::new();
        for &crime in CrimeType::all() {
            for &year in &years {
                let rate = crime.rate_column(year);
                if !self.has_column(&rate) {
                    continue;
                }
                let count = crime.count_column(year);
                let count = self.has_column(&count).then_some(count);
                columns.push((crime, year, count, rate));
            }
        }

        self.rows
            .iter()
            .map(|row| {
                let mut history = CrimeHistory::default();
                for (crime, year, count_column, rate_column) in &columns {
                    let count = count_column
                        .as_deref()
                        .map(|c| row.count(c))
                        .transpose()?;
                    let rate = row.non_negative(rate_column)?;
                    history.insert(CrimeObservation {
                        crime: *crime,
                        year: *year,
                        count,
                        rate,
                    });
                }
                Ok((row.neighbourhood.clone(), history))
            })
            .collect()
    }
}

impl RawRow {
    fn raw(&self, column: &str) -> Result<&str, NeighborhoodError> {
        match self.fields.get(column).map(String::as_str) {
            Some(value) if !value.is_empty() && !value.eq_ignore_ascii_case("na") => Ok(value),
            _ => Err(NeighborhoodError::MissingValue {
                column: column.to_string(),
                neighbourhood: self.neighbourhood.clone(),
            }),
        }
    }

    fn invalid(&self, column: &str, value: &str, reason: impl Into<String>) -> NeighborhoodError {
        NeighborhoodError::InvalidValue {
            column: column.to_string(),
            neighbourhood: self.neighbourhood.clone(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Parses a finite floating-point cell.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborhoodError::MissingValue`] for empty cells and
    /// [`NeighborhoodError::InvalidValue`] for unparseable or non-finite
    /// values.
    pub fn float(&self, column: &str) -> Result<f64, NeighborhoodError> {
        let raw = self.raw(column)?;
        let value: f64 = raw
            .replace(',', "")
            .parse()
            .map_err(|e| self.invalid(column, raw, format!("{e}")))?;
        if !value.is_finite() {
            return Err(self.invalid(column, raw, "value is not finite"));
        }
        Ok(value)
    }

    /// Parses a finite, non-negative floating-point cell.
    ///
    /// # Errors
    ///
    /// Same as [`Self::float`], plus [`NeighborhoodError::InvalidValue`] for
    /// negative values.
    pub fn non_negative(&self, column: &str) -> Result<f64, NeighborhoodError> {
        let value = self.float(column)?;
        if value < 0.0 {
            return Err(self.invalid(column, &value.to_string(), "value is negative"));
        }
        Ok(value)
    }

    /// Parses a non-negative whole-number count. Counts exported as floats
    /// (`1234.0`) are accepted as long as they are integral.
    ///
    /// # Errors
    ///
    /// Same as [`Self::non_negative`], plus
    /// [`NeighborhoodError::InvalidValue`] for fractional or overflowing
    /// values.
    pub fn count(&self, column: &str) -> Result<u32, NeighborhoodError> {
        let value = self.non_negative(column)?;
        if value.fract() != 0.0 {
            return Err(self.invalid(column, &value.to_string(), "count is not a whole number"));
        }
        if value > f64::from(u32::MAX) {
            return Err(self.invalid(column, &value.to_string(), "count is too large"));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = value as u32;
        Ok(count)
    }

    /// Parses the census profile columns of this row and derives its rates.
    ///
    /// # Errors
    ///
    /// Returns an error if any profile cell is missing or invalid, or if a
    /// derived rate has a zero denominator.
    pub fn profile(&self) -> Result<SocioeconomicProfile, NeighborhoodError> {
        let counts = ProfileCounts {
            total_households: self.count("total_households")?,
            one_parent_families: self.count("one_parent_families")?,
            two_parent_families: self.count("two_parent_families")?,
            median_income: self.non_negative("median_income")?,
            unemployment_rate: self.non_negative("unemployment_rate")?,
            total_education: self.count("total_education")?,
            bachelors_or_higher: self.count("bachelors_or_higher")?,
        };

        SocioeconomicProfile::from_counts(counts).map_err(|e| NeighborhoodError::InvalidValue {
            column: e.column.to_string(),
            neighbourhood: self.neighbourhood.clone(),
            value: String::new(),
            reason: e.reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_CSV: &str = "\
neighbourhood,total_households,one_parent_families,two_parent_families,median_income,unemployment_rate,total_education,bachelors_or_higher
 Annex ,10000,200,800,\"120,000\",0.05,8000,5000
Rexdale,6000,600,600,60000,0.12,5000.0,1000
";

    #[test]
    fn reads_profiles_with_trimming_and_thousands_separators() {
        let table = RawTable::read(PROFILE_CSV.as_bytes(), "profile").unwrap();
        let profiles = table.profiles().unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].0, "Annex");
        assert!((profiles[0].1.counts.median_income - 120_000.0).abs() < 1e-9);
        assert!((profiles[0].1.prop_single_parent - 0.2).abs() < 1e-12);
        assert!((profiles[1].1.prop_single_parent - 0.5).abs() < 1e-12);
        assert!((profiles[1].1.education_rate - 0.2).abs() < 1e-12);
    }

    #[test]
    fn missing_neighbourhood_column_is_rejected() {
        let err = RawTable::read("name,x\nA,1\n".as_bytes(), "crime").unwrap_err();
        assert!(matches!(
            err,
            NeighborhoodError::MissingColumn { table: "crime", .. }
        ));
    }

    #[test]
    fn repeated_headers_are_rejected() {
        let csv = "neighbourhood,median_income,median_income\nAnnex,120000,60000\n";
        let err = RawTable::read(csv.as_bytes(), "profile").unwrap_err();
        assert!(matches!(
            err,
            NeighborhoodError::InvalidValue { ref column, .. } if column == "median_income"
        ));
    }

    #[test]
    fn empty_cells_are_missing_values_not_zero() {
        let csv = "\
neighbourhood,total_households,one_parent_families,two_parent_families,median_income,unemployment_rate,total_education,bachelors_or_higher
Annex,10000,200,800,,0.05,8000,5000
";
        let table = RawTable::read(csv.as_bytes(), "profile").unwrap();
        let err = table.profiles().unwrap_err();
        match err {
            NeighborhoodError::MissingValue {
                column,
                neighbourhood,
            } => {
                assert_eq!(column, "median_income");
                assert_eq!(neighbourhood, "Annex");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fractional_counts_are_invalid() {
        let csv = "neighbourhood,total_households\nAnnex,10.5\n";
        let table = RawTable::read(csv.as_bytes(), "profile").unwrap();
        let err = table.rows()[0].count("total_households").unwrap_err();
        assert!(matches!(err, NeighborhoodError::InvalidValue { .. }));
    }

    #[test]
    fn crime_histories_require_every_analysed_rate_column() {
        let csv = "neighbourhood,assault_rate_2019\nAnnex,100\n";
        let table = RawTable::read(csv.as_bytes(), "crime").unwrap();
        let err = table.crime_histories().unwrap_err();
        assert!(matches!(err, NeighborhoodError::MissingColumn { .. }));
    }

    #[test]
    fn crime_histories_read_optional_counts() {
        let years = study_years();
        let mut header = vec![NEIGHBOURHOOD_COLUMN.to_string()];
        let mut values = vec!["Annex".to_string()];
        for crime in CrimeType::analyzed() {
            for &year in &years {
                header.push(crime.rate_column(year));
                values.push("12.5".to_string());
            }
        }
        header.push(CrimeType::Assault.count_column(2019));
        values.push("3".to_string());
        let csv = format!("{}\n{}\n", header.join(","), values.join(","));

        let table = RawTable::read(csv.as_bytes(), "crime").unwrap();
        let histories = table.crime_histories().unwrap();
        let (name, history) = &histories[0];
        assert_eq!(name, "Annex");
        assert_eq!(history.len(), CrimeType::analyzed().len() * years.len());
        assert_eq!(history.get(CrimeType::Assault, 2019).unwrap().count, Some(3));
        assert_eq!(history.get(CrimeType::Assault, 2020).unwrap().count, None);
        assert!(history.get(CrimeType::Homicide, 2019).is_none());
    }

    #[test]
    fn negative_rates_are_invalid() {
        let csv = "neighbourhood,r\nAnnex,-1\n";
        let table = RawTable::read(csv.as_bytes(), "crime").unwrap();
        assert!(matches!(
            table.rows()[0].non_negative("r"),
            Err(NeighborhoodError::InvalidValue { .. })
        ));
    }
}
