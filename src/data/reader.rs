//! Streaming readers over node and edge lists
//!
//! Sequential reading goes through a buffered reader. Parallel reading maps
//! the file in memory, cuts the data region into line-aligned byte ranges and
//! parses batches of ranges on the rayon pool; results are always handed back
//! in file order.

use std::fs::File;
use std::io::{BufRead, BufReader};

use memmap2::Mmap;
use rayon::prelude::*;

use crate::data::schema::{decode_line, ParsingPlan};
use crate::data::tokenizer::FieldSplitter;
use crate::error::{ListError, Result};

/// Smallest byte range handed to a worker
const MIN_CHUNK_BYTES: usize = 1 << 20;

/// Largest byte range handed to a worker, bounding per-batch memory
const MAX_CHUNK_BYTES: usize = 64 << 20;

/// One data row of a list
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based line number in the file
    pub line_number: usize,
    pub fields: Vec<String>,
}

/// Reader for a single file under a resolved parsing plan
#[derive(Debug, Clone)]
pub struct ListReader {
    plan: ParsingPlan,
}

impl ListReader {
    pub fn new(plan: ParsingPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &ParsingPlan {
        &self.plan
    }

    /// Lazy sequence of the data rows.
    ///
    /// Every call reopens the file, so the sequence can be restarted.
    pub fn rows(&self) -> Result<Rows<'_>> {
        let file = File::open(&self.plan.path).map_err(ListError::io(&self.plan.path))?;
        Ok(Rows {
            plan: &self.plan,
            reader: BufReader::with_capacity(1 << 17, file),
            buffer: Vec::with_capacity(256),
            splitter: self.plan.splitter(),
            line_number: 0,
            leading_rows: self.plan.leading_rows(),
            emitted: 0,
        })
    }

    /// Visit every data row in order without allocating owned rows
    pub fn for_each_row<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &[&str]) -> Result<()>,
    {
        let file = File::open(&self.plan.path).map_err(ListError::io(&self.plan.path))?;
        let mut reader = BufReader::with_capacity(1 << 17, file);
        let mut buffer = Vec::with_capacity(256);
        let mut splitter = self.plan.splitter();
        let mut line_number = 0;
        let mut leading_rows = self.plan.leading_rows();
        let mut emitted = 0;

        loop {
            if self.plan.max_rows_number.map_or(false, |max| emitted >= max) {
                return Ok(());
            }
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .map_err(ListError::io(&self.plan.path))?;
            if read == 0 {
                return Ok(());
            }
            line_number += 1;
            let line = decode_line(&buffer, &self.plan.path, line_number)?;
            if self.plan.is_ignored(line) {
                continue;
            }
            if leading_rows > 0 {
                leading_rows -= 1;
                continue;
            }
            let fields = self.plan.split(&mut splitter, line, line_number)?;
            visit(line_number, &fields)?;
            emitted += 1;
        }
    }

    /// Parse the file in parallel.
    ///
    /// `map` runs concurrently on line-aligned chunks; `consume` receives the
    /// mapped chunks strictly in file order. With a row cap the file is one
    /// single chunk, since the cap depends on the rows before each chunk.
    pub fn par_map_chunks<T, M, C>(&self, map: M, mut consume: C) -> Result<()>
    where
        T: Send,
        M: Fn(&Chunk<'_>) -> Result<T> + Sync,
        C: FnMut(T) -> Result<()>,
    {
        let file = File::open(&self.plan.path).map_err(ListError::io(&self.plan.path))?;
        let length = file.metadata().map_err(ListError::io(&self.plan.path))?.len();
        if length == 0 {
            return Ok(());
        }
        // SAFETY: the mapping is read-only and the list is not modified while
        // it is parsed; a concurrent writer is outside the supported usage.
        let mmap = unsafe { Mmap::map(&file) }.map_err(ListError::io(&self.plan.path))?;
        let bytes: &[u8] = &mmap;

        let (data_start, lines_before) = self.data_region_start(bytes)?;
        let chunks = self.split_chunks(bytes, data_start, lines_before);
        log::debug!(
            "Parsing {} in {} chunks",
            self.plan.path.display(),
            chunks.len()
        );

        let batch_size = rayon::current_num_threads().max(1);
        for batch in chunks.chunks(batch_size) {
            let mapped: Vec<Result<T>> = batch.par_iter().map(|chunk| map(chunk)).collect();
            for result in mapped {
                consume(result?)?;
            }
        }
        Ok(())
    }

    /// Byte offset where data rows begin and the number of lines before it
    fn data_region_start(&self, bytes: &[u8]) -> Result<(usize, usize)> {
        let mut leading_rows = self.plan.leading_rows();
        let mut offset = 0;
        let mut line_number = 0;
        while leading_rows > 0 && offset < bytes.len() {
            let end = memchr_newline(bytes, offset).map_or(bytes.len(), |position| position + 1);
            line_number += 1;
            let line = decode_line(&bytes[offset..end], &self.plan.path, line_number)?;
            if !self.plan.is_ignored(line) {
                leading_rows -= 1;
            }
            offset = end;
        }
        Ok((offset, line_number))
    }

    fn split_chunks<'a>(&'a self, bytes: &'a [u8], start: usize, lines_before: usize) -> Vec<Chunk<'a>> {
        let data = &bytes[start..];
        if data.is_empty() {
            return Vec::new();
        }

        if self.plan.max_rows_number.is_some() {
            return vec![Chunk {
                plan: &self.plan,
                bytes: data,
                first_line: lines_before + 1,
                max_rows: self.plan.max_rows_number,
            }];
        }

        let threads = rayon::current_num_threads().max(1);
        let target = (data.len() / threads).clamp(MIN_CHUNK_BYTES, MAX_CHUNK_BYTES);

        let mut ranges = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let tentative = (offset + target).min(data.len());
            let end = if tentative == data.len() {
                tentative
            } else {
                memchr_newline(data, tentative).map_or(data.len(), |position| position + 1)
            };
            ranges.push(offset..end);
            offset = end;
        }

        let newlines: Vec<usize> = ranges
            .par_iter()
            .map(|range| data[range.clone()].iter().filter(|&&byte| byte == b'\n').count())
            .collect();

        let mut first_line = lines_before + 1;
        ranges
            .into_iter()
            .zip(newlines)
            .map(|(range, newlines)| {
                let chunk = Chunk {
                    plan: &self.plan,
                    bytes: &data[range],
                    first_line,
                    max_rows: None,
                };
                first_line += newlines;
                chunk
            })
            .collect()
    }
}

fn memchr_newline(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..].iter().position(|&byte| byte == b'\n').map(|position| from + position)
}

/// Lazy iterator over owned data rows
pub struct Rows<'a> {
    plan: &'a ParsingPlan,
    reader: BufReader<File>,
    buffer: Vec<u8>,
    splitter: FieldSplitter,
    line_number: usize,
    leading_rows: usize,
    emitted: usize,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.plan.max_rows_number.map_or(false, |max| self.emitted >= max) {
                return None;
            }
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(error) => return Some(Err(ListError::io(&self.plan.path)(error))),
            }
            self.line_number += 1;
            let line = match decode_line(&self.buffer, &self.plan.path, self.line_number) {
                Ok(line) => line,
                Err(error) => return Some(Err(error)),
            };
            if self.plan.is_ignored(line) {
                continue;
            }
            if self.leading_rows > 0 {
                self.leading_rows -= 1;
                continue;
            }
            self.emitted += 1;
            let line_number = self.line_number;
            return Some(self.plan.split(&mut self.splitter, line, line_number).map(|fields| Row {
                line_number,
                fields: fields.into_iter().map(str::to_string).collect(),
            }));
        }
    }
}

/// A line-aligned byte range of a memory-mapped list
#[derive(Debug)]
pub struct Chunk<'a> {
    plan: &'a ParsingPlan,
    bytes: &'a [u8],
    /// Line number of the first line in the chunk
    first_line: usize,
    max_rows: Option<usize>,
}

impl<'a> Chunk<'a> {
    pub fn first_line(&self) -> usize {
        self.first_line
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Visit every data row of the chunk in order
    pub fn for_each_row<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &[&str]) -> Result<()>,
    {
        let mut splitter = self.plan.splitter();
        let mut line_number = self.first_line;
        let mut emitted = 0;
        for raw in self.bytes.split_inclusive(|&byte| byte == b'\n') {
            if self.max_rows.map_or(false, |max| emitted >= max) {
                break;
            }
            let line = decode_line(raw, &self.plan.path, line_number)?;
            if !self.plan.is_ignored(line) {
                let fields = self.plan.split(&mut splitter, line, line_number)?;
                visit(line_number, &fields)?;
                emitted += 1;
            }
            line_number += 1;
        }
        Ok(())
    }
}
