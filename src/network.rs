use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, error, info, warn};

use crate::architecture::ArchitectureConfig;
use crate::config::NetworkConfig;
use crate::error::{configuration, uninitialized, Error, Result};
use crate::layer::{parameter_bytes, Layer};
use crate::tensor::{ExecutionMode, Shape, Tensor};

/// Leading bytes of every parameter file.
pub const PARAMETER_MAGIC: [u8; 4] = *b"CNNP";
pub const PARAMETER_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Ordered stack of layers. Insertion order is execution order.
pub struct Network {
    layers: Vec<Layer>,
    config: NetworkConfig,
    pool: Option<rayon::ThreadPool>,
}

impl Default for Network {
    fn default() -> Self {
        Network { layers: Vec::new(), config: NetworkConfig::default(), pool: None }
    }
}

impl Network {

    pub fn new(config: NetworkConfig) -> Result<Self> {
        let pool = match config.num_threads {
            Some(0) => return Err(configuration("num_threads must be at least 1")),
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| configuration(format!("failed to build thread pool: {}", e)))?,
            ),
            None => None,
        };
        Ok(Network { layers: Vec::new(), config, pool })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn add(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn architecture(&self) -> ArchitectureConfig {
        ArchitectureConfig { layers: self.layers.iter().map(|l| l.kind().into()).collect() }
    }

    /// Shape `predict` would return for an input of `input` shape, without
    /// running any layer.
    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        self.layers.iter().try_fold(input, |shape, layer| layer.kind().output_shape(shape))
    }

    /// Fills every parameterized layer with seeded random weights.
    pub fn randomize(&mut self, seed: u64) -> Result<()> {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.randomize(seed.wrapping_add(index as u64))?;
        }
        Ok(())
    }

    /// Loads a parameter file; paths ending in `.gz` are decompressed on the fly.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let reader: Box<dyn Read> = if is_gzip(path) {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        info!(path = %path.display(), "loading parameters");
        self.load_from_reader(BufReader::new(reader))
    }

    /// Reads a parameter stream into every parameterized layer. Either all
    /// layers receive their new parameters or, on error, none do.
    pub fn load_from_reader<R: Read>(&mut self, mut reader: R) -> Result<()> {
        read_header(&mut reader)?;

        let mut staged = Vec::new();
        let mut consumed = HEADER_LEN;
        for (index, layer) in self.layers.iter().enumerate() {
            let segment = layer.read_parameters(&mut reader).map_err(|e| Error::ParameterLoad {
                layer: index,
                reason: format!("{} segment: {}", layer.kind(), e),
            })?;
            if let Some((weights, bias)) = segment {
                let bytes = parameter_bytes(&weights, &bias);
                debug!(layer = index, kind = %layer.kind(), bytes, "layer parameters read");
                consumed += bytes;
                staged.push((index, weights, bias));
            }
        }

        let trailing = io::copy(&mut reader, &mut io::sink())?;
        if trailing > 0 {
            warn!(trailing, "ignoring trailing bytes after last parameter segment");
        }

        for (index, weights, bias) in staged {
            self.layers[index].set_parameters(weights, bias)?;
        }
        info!(bytes = consumed, layers = self.layers.len(), "parameters loaded");
        Ok(())
    }

    /// Writes a parameter file `load` can read back; `.gz` paths are compressed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;

        let written = if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            let written = self.save_to_writer(&mut encoder)?;
            encoder.finish()?.flush()?;
            written
        } else {
            let mut writer = BufWriter::new(file);
            let written = self.save_to_writer(&mut writer)?;
            writer.flush()?;
            written
        };

        info!(path = %path.display(), bytes = written, "parameters saved");
        Ok(())
    }

    pub fn save_to_writer<W: Write>(&self, mut writer: W) -> Result<usize> {
        writer.write_all(&PARAMETER_MAGIC)?;
        writer.write_all(&PARAMETER_VERSION.to_le_bytes())?;

        let mut written = HEADER_LEN;
        for layer in &self.layers {
            written += layer.write_parameters(&mut writer)?;
        }
        Ok(written)
    }

    /// Runs `input` through every layer in order and returns the last output.
    /// An empty network returns `input` unchanged.
    pub fn predict(&mut self, input: Tensor) -> Result<Tensor> {
        let mode = self.config.execution_mode;
        let debug = self.config.debug;
        let layers = &mut self.layers;

        match &self.pool {
            Some(pool) => pool.install(|| run_layers(layers, input, mode, debug)),
            None => run_layers(layers, input, mode, debug),
        }
    }

    pub fn print(&self) {
        for (index, layer) in self.layers.iter().enumerate() {
            println!("[{}] {}", index, layer);
        }
    }
}

fn run_layers(layers: &mut [Layer], input: Tensor, mode: ExecutionMode, debug: bool) -> Result<Tensor> {
    let mut current = input;
    for (index, layer) in layers.iter_mut().enumerate() {
        layer.set_input(current);
        if let Err(e) = layer.forward(mode) {
            error!(layer = index, kind = %layer.kind(), "forward pass failed: {}", e);
            return Err(e);
        }

        let output = layer
            .output()
            .ok_or_else(|| uninitialized(format!("{} produced no output", layer.kind())))?;
        if debug {
            debug!(layer = index, kind = %layer.kind(), shape = ?output.shape(), "forward pass complete");
        }
        current = output.clone();
    }
    Ok(current)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

fn header_error(reason: String) -> Error {
    Error::ParameterLoad { layer: 0, reason: format!("header: {}", reason) }
}

fn read_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(|e| header_error(e.to_string()))?;
    if header[..4] != PARAMETER_MAGIC {
        return Err(header_error(format!(
            "invalid magic {:?} (expected {:?})",
            &header[..4], PARAMETER_MAGIC
        )));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != PARAMETER_VERSION {
        return Err(header_error(format!(
            "unsupported version {} (expected {})",
            version, PARAMETER_VERSION
        )));
    }
    Ok(())
}
